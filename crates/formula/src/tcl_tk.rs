//! Built-in recipe: Tcl 8.6.4 with the Tk toolkit and Tcllib.
//!
//! Tcl is the primary resource. Tk builds against the freshly installed Tcl
//! (it looks up `tclsh` on `PATH` and links against `<prefix>/lib`), so it
//! is planned after Tcl with `<prefix>/bin` prepended to its `PATH`. Tcllib
//! only needs a `tclsh` to install its modules.

use crate::options::OptionSpec;
use crate::platform::{HostDependency, LEOPARD, PatchGate};
use crate::recipe::{
    ArgRule, BuildScript, ConfigureScript, Recipe, ResourceSpec, SmokeTest, StepTemplate,
};
use crate::types::ResourceDescriptor;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Tcl/Tk version built by this recipe.
pub const VERSION: &str = "8.6.4";

/// Patch for the sqlite bundled with Tcl; Tiger lacks
/// `OSAtomicCompareAndSwapPtrBarrier`.
pub const SQLITE_LEGACY_ATOMICS_PATCH: &str = include_str!("../data/sqlite-legacy-atomics.patch");

/// The Tcl/Tk recipe.
#[must_use]
pub fn recipe() -> Recipe {
    Recipe {
        name: "tcl-tk".to_string(),
        description: "Tool Command Language".to_string(),
        homepage: "https://www.tcl.tk/".to_string(),
        primary: tcl(),
        resources: vec![tk(), tcllib()],
        options: vec![
            OptionSpec::new("threads", "Build with multithreading support", false)
                .configure_arg("--enable-threads"),
            OptionSpec::new("tcllib", "Build tcllib (utility modules)", true),
            OptionSpec::new("tk", "Build the Tk (window toolkit)", true),
            OptionSpec::new("x11", "Build X11-based Tk instead of Aqua-based Tk", false)
                .requires(HostDependency::X11),
            OptionSpec::new("aqua", "Build Aqua-based Tk", true),
        ],
        deprecated: BTreeMap::from([("enable-threads".to_string(), "with-threads".to_string())]),
        exclusive: vec![["x11".to_string(), "aqua".to_string()]],
        test: Some(SmokeTest {
            executable: PathBuf::from("bin/tclsh"),
            input: "puts honk\n".to_string(),
            expected: "honk".to_string(),
        }),
    }
}

fn tcl() -> ResourceSpec {
    let descriptor = ResourceDescriptor::new(
        "tcl",
        "https://downloads.sourceforge.net/project/tcl/Tcl/8.6.4/tcl8.6.4-src.tar.gz",
        VERSION,
        "9e6ed94c981c1d0c5f5fefb8112d06c6bf4d050a7327e95e71d417c416519c8d",
    )
    .with_patch(SQLITE_LEGACY_ATOMICS_PATCH);

    ResourceSpec {
        descriptor,
        enabled_by: None,
        depends_on: None,
        patch_gate: Some(PatchGate {
            os: "macos".to_string(),
            below: LEOPARD,
        }),
        build: BuildScript {
            working_dir: PathBuf::from("unix"),
            configure: Some(ConfigureScript {
                option_flags: true,
                word_width_flag: Some("--enable-64bit".to_string()),
                ..ConfigureScript::default()
            }),
            steps: vec![
                StepTemplate::new("make", Vec::<String>::new()),
                StepTemplate::new("make", ["install"]),
                StepTemplate::new("make", ["install-private-headers"]),
                StepTemplate::new("ln", ["-sf", "tclsh8.6", "{bin}/tclsh"]),
            ],
            prepend_bin_to_path: false,
        },
    }
}

fn tk() -> ResourceSpec {
    let descriptor = ResourceDescriptor::new(
        "tk",
        "https://downloads.sourceforge.net/project/tcl/Tcl/8.6.4/tk8.6.4-src.tar.gz",
        VERSION,
        "08f99df85e5dc9c4271762163c6aabb962c8b297dc5c4c1af8bdd05fc2dd26c1",
    );

    ResourceSpec {
        descriptor,
        enabled_by: Some("tk".to_string()),
        depends_on: Some("tcl".to_string()),
        patch_gate: None,
        build: BuildScript {
            working_dir: PathBuf::from("unix"),
            configure: Some(ConfigureScript {
                args: vec!["--with-tcl={lib}".to_string()],
                option_flags: true,
                word_width_flag: Some("--enable-64bit".to_string()),
                rules: vec![
                    ArgRule::with("x11", ["--with-x"]),
                    ArgRule::with("aqua", ["--enable-aqua=yes", "--without-x"]),
                ],
                ..ConfigureScript::default()
            }),
            steps: vec![
                StepTemplate::new("make", ["TK_LIBRARY={lib}"]),
                StepTemplate::new("make", ["install"]),
                StepTemplate::new("make", ["install-private-headers"]),
                StepTemplate::new("ln", ["-sf", "wish8.6", "{bin}/wish"]),
            ],
            prepend_bin_to_path: true,
        },
    }
}

fn tcllib() -> ResourceSpec {
    let descriptor = ResourceDescriptor::new(
        "tcllib",
        "https://github.com/tcltk/tcllib/archive/tcllib_1_17.tar.gz",
        "1.17",
        "95c676130ce2fdb00e8a6f79c4fea9e79d071063783a61db9274647920d97a03",
    );

    ResourceSpec {
        descriptor,
        enabled_by: Some("tcllib".to_string()),
        depends_on: Some("tcl".to_string()),
        patch_gate: None,
        build: BuildScript {
            configure: Some(ConfigureScript::default()),
            steps: vec![StepTemplate::new("make", ["install"])],
            prepend_bin_to_path: true,
            ..BuildScript::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors_are_valid() {
        let recipe = recipe();
        for spec in recipe.all_resources() {
            spec.descriptor.validate().unwrap();
        }
    }

    #[test]
    fn test_resource_order() {
        let recipe = recipe();
        let names: Vec<&str> = recipe.all_resources().map(ResourceSpec::name).collect();
        assert_eq!(names, vec!["tcl", "tk", "tcllib"]);
    }

    #[test]
    fn test_patch_is_a_unified_diff() {
        assert!(SQLITE_LEGACY_ATOMICS_PATCH.starts_with("diff --git"));
        assert!(SQLITE_LEGACY_ATOMICS_PATCH.contains("fc_atomic_ptr_cmpexch"));
    }

    #[test]
    fn test_smoke_test() {
        let test = recipe().test.unwrap();
        assert_eq!(test.executable, PathBuf::from("bin/tclsh"));
        assert_eq!(test.input, "puts honk\n");
        assert_eq!(test.expected, "honk");
    }
}
