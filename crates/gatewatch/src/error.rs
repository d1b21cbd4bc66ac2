//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use gatewatch_core::CoreError;

/// Exit codes for process termination.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────

    #[error("No feed token configured for profile '{profile}'")]
    #[diagnostic(
        code(gatewatch::no_credentials),
        help(
            "Store one with: gatewatch config set-token\n\
             Or set the GATEWATCH_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("No feed endpoint configured")]
    #[diagnostic(
        code(gatewatch::no_endpoint),
        help(
            "Pass --endpoint, set GATEWATCH_ENDPOINT, or create a config file with: \
             gatewatch config init\n\
             Expected at: {path}"
        )
    )]
    NoEndpoint { path: String },

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(gatewatch::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: gatewatch config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(gatewatch::config))]
    Config(Box<figment::Error>),

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(gatewatch::validation))]
    Validation { field: String, reason: String },

    // ── Feed lifecycle ───────────────────────────────────────────────

    #[error("The feed has been closed")]
    #[diagnostic(code(gatewatch::closed))]
    FeedClosed,

    // ── IO ───────────────────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Validation { .. } => exit_code::USAGE,
            Self::FeedClosed => exit_code::CONNECTION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthMissing => CliError::NoCredentials {
                profile: "current".into(),
            },
            CoreError::Closed => CliError::FeedClosed,
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}
