//! Error types for recipe operations.
//!
//! Errors are grouped into categories that follow the lifecycle of a recipe:
//! pre-flight checks, staging, the build itself, and post-install
//! verification. The category decides the process exit code and the advice
//! shown to the user.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for recipe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle phase in which an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Recipe, option or dependency problem found before touching the filesystem.
    PreFlight,
    /// Fetching, checksum, extraction or patching of a source artifact.
    Staging,
    /// A configure/make step failed; the prefix may hold a partial install.
    Build,
    /// The smoke test did not produce the expected output.
    Verification,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::PreFlight => "Invalid recipe or options",
            Self::Staging => "Source staging failed",
            Self::Build => "Build step failed",
            Self::Verification => "Post-install check failed",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::PreFlight => "Check the recipe fields and the --with/--without flags",
            Self::Staging => {
                "The download may be corrupted or the patch outdated, nothing was installed"
            }
            Self::Build => {
                "Inspect the captured output above; the prefix may contain a partial install"
            }
            Self::Verification => "The package is installed but did not pass its smoke test",
            Self::Other => "Check the error details for more information",
        }
    }

    /// Process exit code used by the CLI for this category.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PreFlight => 2,
            Self::Staging => 3,
            Self::Build => 4,
            Self::Verification => 5,
            Self::Other => 1,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while validating, staging, building or verifying
/// a recipe.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A resource descriptor failed validation.
    #[error("malformed descriptor for {name}: {reason}")]
    MalformedDescriptor {
        /// Resource name (may be empty if the name itself is missing).
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A user flag does not name any declared option.
    #[error("unknown option: {0}")]
    UnknownOption(String),

    /// Two options that cannot both be on were forced on, or one option was
    /// forced both on and off.
    #[error("conflicting options: {first} and {second}")]
    ConflictingOptions {
        /// First option name.
        first: String,
        /// Second option name.
        second: String,
    },

    /// An optional host dependency was requested but is not available.
    #[error("option {option} requires {dependency}, which is not available")]
    MissingDependency {
        /// Option that pulled the dependency in.
        option: String,
        /// Missing dependency.
        dependency: String,
    },

    /// The artifact could not be obtained.
    #[error("failed to fetch {resource} from {url}: {message}")]
    FetchFailed {
        /// Resource name.
        resource: String,
        /// Source URL.
        url: String,
        /// Error message.
        message: String,
        /// Whether a later attempt might succeed (network hiccup).
        transient: bool,
    },

    /// The artifact's SHA-256 does not match the descriptor.
    #[error("checksum mismatch for {resource}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Resource name.
        resource: String,
        /// Checksum from the descriptor.
        expected: String,
        /// Checksum of the bytes we received.
        actual: String,
    },

    /// The archive could not be unpacked.
    #[error("failed to extract {resource}: {message}")]
    ExtractionFailed {
        /// Resource name.
        resource: String,
        /// Error message.
        message: String,
    },

    /// The inline patch did not apply cleanly.
    #[error("patch for {resource} did not apply:\n{output}")]
    PatchApplicationFailed {
        /// Resource name.
        resource: String,
        /// Output of the patch program.
        output: String,
    },

    /// A build step exited non-zero (or timed out).
    #[error(
        "{resource}: step {step_index} ({command}) failed with {}{}",
        exit_label(.exit_code),
        timeout_suffix(.timed_out)
    )]
    BuildStepFailed {
        /// Resource whose step failed.
        resource: String,
        /// Zero-based index of the step within the resource's plan.
        step_index: usize,
        /// Command line of the failing step.
        command: String,
        /// Exit code, `None` when terminated by a signal or killed.
        exit_code: Option<i32>,
        /// Last lines of combined stdout/stderr.
        output_tail: String,
        /// Whether the step was killed after exceeding its timeout.
        timed_out: bool,
    },

    /// The smoke test produced unexpected output.
    #[error(
        "{resource}: verification failed: expected {expected_output:?}, got {actual_output:?}"
    )]
    VerificationFailed {
        /// Recipe or resource whose installation was checked.
        resource: String,
        /// Output the recipe expects.
        expected_output: String,
        /// Output the installed program produced.
        actual_output: String,
    },

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code".to_string(),
    }
}

fn timeout_suffix(timed_out: &bool) -> &'static str {
    if *timed_out { " (timed out)" } else { "" }
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a malformed-descriptor error.
    pub fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDescriptor {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Get the lifecycle category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MalformedDescriptor { .. } => ErrorCategory::PreFlight,
            Error::UnknownOption(_) => ErrorCategory::PreFlight,
            Error::ConflictingOptions { .. } => ErrorCategory::PreFlight,
            Error::MissingDependency { .. } => ErrorCategory::PreFlight,
            Error::FetchFailed { .. } => ErrorCategory::Staging,
            Error::ChecksumMismatch { .. } => ErrorCategory::Staging,
            Error::ExtractionFailed { .. } => ErrorCategory::Staging,
            Error::PatchApplicationFailed { .. } => ErrorCategory::Staging,
            Error::BuildStepFailed { .. } => ErrorCategory::Build,
            Error::VerificationFailed { .. } => ErrorCategory::Verification,
            Error::Io { .. } => ErrorCategory::Other,
            Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error could go away on a later attempt.
    ///
    /// Only network fetches qualify. Nothing in this crate retries on its
    /// own; the flag only shapes the message shown to the user.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::FetchFailed { transient: true, .. })
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_exit_codes_are_distinct() {
        let codes = [
            ErrorCategory::PreFlight.exit_code(),
            ErrorCategory::Staging.exit_code(),
            ErrorCategory::Build.exit_code(),
            ErrorCategory::Verification.exit_code(),
            ErrorCategory::Other.exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_preflight_errors() {
        assert_eq!(
            Error::UnknownOption("with-foo".into()).category(),
            ErrorCategory::PreFlight
        );
        assert_eq!(
            Error::malformed("tcl", "empty url").category(),
            ErrorCategory::PreFlight
        );
        let err = Error::ConflictingOptions {
            first: "x11".into(),
            second: "aqua".into(),
        };
        assert_eq!(err.category(), ErrorCategory::PreFlight);
        assert!(err.to_string().contains("x11"));
    }

    #[test]
    fn test_staging_errors() {
        let err = Error::ChecksumMismatch {
            resource: "tk".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Staging);
        assert!(!err.is_retryable());

        let err = Error::PatchApplicationFailed {
            resource: "tcl".into(),
            output: "Hunk #1 FAILED".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Staging);
    }

    #[test]
    fn test_fetch_retryable_only_when_transient() {
        let err = Error::FetchFailed {
            resource: "tcl".into(),
            url: "https://example.invalid".into(),
            message: "timeout".into(),
            transient: true,
        };
        assert!(err.is_retryable());

        let err = Error::FetchFailed {
            resource: "tcl".into(),
            url: "https://example.invalid".into(),
            message: "HTTP 404".into(),
            transient: false,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_build_step_failed_display() {
        let err = Error::BuildStepFailed {
            resource: "tk".into(),
            step_index: 1,
            command: "make".into(),
            exit_code: Some(2),
            output_tail: "error".into(),
            timed_out: false,
        };
        let msg = err.to_string();
        assert!(msg.contains("tk"));
        assert!(msg.contains("step 1"));
        assert!(msg.contains("exit code 2"));
        assert_eq!(err.category(), ErrorCategory::Build);

        let err = Error::BuildStepFailed {
            resource: "tcl".into(),
            step_index: 0,
            command: "./configure".into(),
            exit_code: None,
            output_tail: String::new(),
            timed_out: true,
        };
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_verification_category() {
        let err = Error::VerificationFailed {
            resource: "tcl".into(),
            expected_output: "honk".into(),
            actual_output: "quack".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Verification);
        assert_eq!(err.category().exit_code(), 5);
        assert_eq!(
            err.to_string(),
            "tcl: verification failed: expected \"honk\", got \"quack\""
        );
    }

    #[test]
    fn test_error_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "not found");
        let err: Error = io_err.into();
        match err {
            Error::Io { path, .. } => assert_eq!(path, PathBuf::new()),
            _ => panic!("Expected Error::Io"),
        }
    }
}
