//! Error type shared by every component.
use crate::exit_codes;
use crate::version::Version;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BootstrapError>;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Required tool not found: {tool} ({hint})")]
    MissingTool { tool: String, hint: String },

    #[error("{name} {found} is too old, {required} or newer is required")]
    VersionTooOld {
        name: String,
        found: Version,
        required: Version,
    },

    #[error("Unsupported host: {0}")]
    UnsupportedHost(String),

    #[error("Container daemon unavailable: {0}")]
    DaemonUnavailable(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Declined: {0}")]
    Declined(String),

    #[error("Project is locked: {0}")]
    Locked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootstrapError {
    /// Process exit code for this error. A declined prompt is an intentional
    /// abort and gets its own code.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::Declined(_) => exit_codes::DECLINED,
            _ => exit_codes::FAILURE,
        }
    }

    pub fn missing_tool(tool: &str, hint: &str) -> Self {
        BootstrapError::MissingTool {
            tool: tool.to_string(),
            hint: hint.to_string(),
        }
    }
}
