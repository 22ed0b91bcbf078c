use thiserror::Error;

/// Core error types for wlt
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// nft command execution failed (exec error, timeout or non-zero exit)
    #[error("nft command failed: {message}")]
    CommandFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// The nft --json dump did not have the expected structure
    #[error("malformed nft dump: {0}")]
    MalformedDump(String),

    /// A grant request did not address every configured outlet group
    #[error("no outlet selected for group '{group}'")]
    MissingSelection { group: String },

    /// A grant request named an outlet that does not exist in its group
    #[error("unknown outlet '{outlet}' in group '{group}'")]
    InvalidSelection { group: String, outlet: String },

    /// A grant request used a duration outside the configured time limits
    #[error("duration of {0} hours is not permitted")]
    InvalidDuration(u32),
}

impl Error {
    /// True for the validation variants raised against caller-supplied
    /// input. These are surfaced to the user as a rejected request; the
    /// command/dump variants never leave the gateway.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::MissingSelection { .. }
                | Error::InvalidSelection { .. }
                | Error::InvalidDuration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
