pub mod build;
pub mod fetch;
pub mod options;
pub mod plan;
pub mod verify;

use crate::cli::OptionArgs;
use crate::config::KilnConfig;
use anyhow::Result;
use formula::{InstallLayout, InstallRequest, PlatformFacts, Recipe};

/// Build an install request for `recipe` from CLI option arguments and config.
pub(crate) fn request(
    recipe: &Recipe,
    config: &KilnConfig,
    options: &OptionArgs,
) -> Result<InstallRequest> {
    let prefix = config.prefix_for(recipe, options.prefix.as_deref())?;
    log::debug!("Install prefix: {}", prefix.display());
    Ok(
        InstallRequest::new(PlatformFacts::detect(), InstallLayout::new(prefix))
            .flags(options.flags()),
    )
}
