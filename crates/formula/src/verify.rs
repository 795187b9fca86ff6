//! Post-install smoke test.
//!
//! Runs the installed executable with a scripted input and compares what it
//! prints. A failed check is reported, never repaired: nothing under the
//! prefix is removed.

use crate::error::{Error, Result};
use crate::recipe::SmokeTest;
use crate::types::InstallationRecord;
use std::io::Write;
use std::process::{Command, Stdio};

/// Outcome of a smoke test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// Whether the output matched.
    pub success: bool,
    /// Expected output.
    pub expected: String,
    /// Output actually produced (chomped), or why there was none.
    pub actual: String,
}

impl VerificationResult {
    /// Turn a failed check of `resource` into `Error::VerificationFailed`.
    pub fn into_result(self, resource: &str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::VerificationFailed {
                resource: resource.to_string(),
                expected_output: self.expected,
                actual_output: self.actual,
            })
        }
    }
}

/// Run `test` against an installation.
///
/// The executable is resolved relative to the record's prefix. A missing
/// executable, a failure to start it, or a non-zero exit all produce an
/// unsuccessful result rather than an error.
pub fn verify(record: &InstallationRecord, test: &SmokeTest) -> VerificationResult {
    let executable = record.prefix.join(&test.executable);
    let failure = |actual: String| VerificationResult {
        success: false,
        expected: test.expected.clone(),
        actual,
    };

    if record.find(&test.executable).is_none() && !executable.is_file() {
        return failure(format!("{} is not installed", executable.display()));
    }

    log::info!("verifying {}", executable.display());
    let mut child = match Command::new(&executable)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return failure(format!("failed to run {}: {e}", executable.display())),
    };

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(test.input.as_bytes());
    }

    let output = match child.wait_with_output() {
        Ok(output) => output,
        Err(e) => return failure(format!("failed to wait for {}: {e}", executable.display())),
    };

    let actual = chomp(&String::from_utf8_lossy(&output.stdout)).to_string();
    if !output.status.success() {
        log::debug!(
            "{} exited with {}: {}",
            executable.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        );
        return failure(actual);
    }

    let success = actual == test.expected;
    log::debug!("smoke test output {actual:?}, expected {:?}", test.expected);
    VerificationResult {
        success,
        expected: test.expected.clone(),
        actual,
    }
}

/// Strip one trailing newline (`\n` or `\r\n`).
fn chomp(s: &str) -> &str {
    s.strip_suffix("\r\n")
        .or_else(|| s.strip_suffix('\n'))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn tclsh_test() -> SmokeTest {
        SmokeTest {
            executable: PathBuf::from("bin/tclsh"),
            input: "puts honk\n".to_string(),
            expected: "honk".to_string(),
        }
    }

    #[cfg(unix)]
    fn install_script(prefix: &Path, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        let bin = prefix.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let path = bin.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_matching_output() {
        let prefix = tempfile::tempdir().unwrap();
        // Reads the script like tclsh would, answers the one command it knows.
        install_script(
            prefix.path(),
            "tclsh",
            "read line; [ \"$line\" = \"puts honk\" ] && echo honk",
        );

        let record = InstallationRecord::scan(prefix.path()).unwrap();
        let result = verify(&record, &tclsh_test());
        assert!(result.success, "{result:?}");
        assert_eq!(result.actual, "honk");
        assert!(result.into_result("tcl").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_mismatched_output_leaves_files() {
        let prefix = tempfile::tempdir().unwrap();
        install_script(prefix.path(), "tclsh", "echo quack");

        let record = InstallationRecord::scan(prefix.path()).unwrap();
        let result = verify(&record, &tclsh_test());
        assert!(!result.success);
        assert_eq!(result.actual, "quack");

        match result.into_result("tcl") {
            Err(Error::VerificationFailed {
                resource,
                expected_output,
                actual_output,
            }) => {
                assert_eq!(resource, "tcl");
                assert_eq!(expected_output, "honk");
                assert_eq!(actual_output, "quack");
            }
            other => panic!("Expected VerificationFailed, got {other:?}"),
        }
        assert!(prefix.path().join("bin/tclsh").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_fails() {
        let prefix = tempfile::tempdir().unwrap();
        install_script(prefix.path(), "tclsh", "echo honk; exit 1");

        let record = InstallationRecord::scan(prefix.path()).unwrap();
        assert!(!verify(&record, &tclsh_test()).success);
    }

    #[test]
    fn test_missing_executable() {
        let prefix = tempfile::tempdir().unwrap();
        let record = InstallationRecord::scan(prefix.path()).unwrap();
        let result = verify(&record, &tclsh_test());
        assert!(!result.success);
        assert!(result.actual.contains("not installed"));
    }

    #[test]
    fn test_chomp() {
        assert_eq!(chomp("honk\n"), "honk");
        assert_eq!(chomp("honk\r\n"), "honk");
        assert_eq!(chomp("honk\n\n"), "honk\n");
        assert_eq!(chomp("honk"), "honk");
    }
}
