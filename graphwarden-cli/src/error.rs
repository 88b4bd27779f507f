//! CLI error types and exit code mapping

use graphwarden_core::error::GraphwardenError;
use graphwarden_detection::DetectionError;
use graphwarden_ingest::IngestError;

/// CLI error type.
///
/// `exit_code()` maps each variant to the process exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Rule loading or validation failed.
    #[error("rule error: {0}")]
    Rule(String),

    /// Detection finished but some rules failed.
    #[error("{failed} rule(s) failed during detection")]
    Detection { failed: usize },

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error.
    #[error("{0}")]
    Core(#[from] GraphwardenError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                          |
    /// |------|----------------------------------|
    /// | 0    | Success                          |
    /// | 1    | General / command error          |
    /// | 2    | Configuration error              |
    /// | 4    | Detection produced rule errors   |
    /// | 10   | IO error                         |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(GraphwardenError::Config(_)) => 2,
            Self::Detection { .. } => 4,
            Self::Io(_) | Self::Core(GraphwardenError::Io(_)) => 10,
            Self::Command(_) | Self::Rule(_) | Self::JsonSerialize(_) | Self::Core(_) => 1,
        }
    }
}

impl From<IngestError> for CliError {
    fn from(e: IngestError) -> Self {
        Self::Core(e.into())
    }
}

impl From<DetectionError> for CliError {
    fn from(e: DetectionError) -> Self {
        Self::Core(e.into())
    }
}
