//! Download and verify a recipe's source archives.

use crate::Context;
use crate::cli::RecipeArgs;
use crate::config::{self, KilnConfig};
use crate::progress;
use crate::ui;
use anyhow::Result;
use formula::{Fetcher, HttpFetcher};

/// Run the fetch command.
///
/// Fetches every resource the recipe declares, whether or not an option
/// enables it, so a later offline build finds everything in the cache.
pub fn run(ctx: &Context, args: RecipeArgs) -> Result<()> {
    let config = KilnConfig::load()?;
    let recipe = config::load_recipe(Some(args.recipe.as_str()))?;
    recipe.validate()?;

    let cache = config.cache_dir()?;
    let fetcher = HttpFetcher::new().with_cache(&cache);

    if !ctx.quiet {
        ui::header(&format!("Fetching {}", recipe.name));
        ui::kv("Cache", &cache.display().to_string());
    }

    let mut fetched = 0usize;
    for resource in recipe.all_resources() {
        let descriptor = &resource.descriptor;
        let pb = progress::spinner(
            format!("{} {}", descriptor.name, descriptor.version),
            ctx.quiet,
        );
        pb.set_message(descriptor.archive_name());
        match fetcher.fetch(descriptor) {
            Ok(bytes) => {
                progress::finish_success(
                    &pb,
                    &format!(
                        "{} {} ({} bytes, sha256 ok)",
                        descriptor.name,
                        descriptor.version,
                        bytes.len()
                    ),
                );
                fetched += 1;
            }
            Err(e) => {
                progress::finish_error(&pb);
                return Err(e.into());
            }
        }
    }

    if !ctx.quiet {
        println!();
        ui::success(&format!("{fetched} archive(s) ready"));
    }
    Ok(())
}
