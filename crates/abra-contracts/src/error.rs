use thiserror::Error;

pub type Result<T> = std::result::Result<T, AbraError>;

/// Failures produced while talking to the Abra backend.
///
/// Only [`AbraError::NoTerminalResponse`] and [`AbraError::StreamStartError`]
/// are retried; everything else reaches the caller as-is.
#[derive(Error, Debug)]
pub enum AbraError {
    /// The access-token endpoint answered with something that is not JSON.
    #[error("{message}")]
    RegionBlocked { message: String },

    #[error("no completed reply found in response payload")]
    NoTerminalResponse,

    #[error("reply stream reported errors on its first line: {detail}")]
    StreamStartError { detail: String },

    #[error("exchange failed after {attempts} attempts; try again later")]
    RetriesExhausted { attempts: u32 },

    #[error("{context}: {message}")]
    Transport { context: String, message: String },

    #[error("malformed conversation id '{raw}': expected 3 '_'-separated parts, found {parts}")]
    MalformedConversationId { raw: String, parts: usize },

    #[error("session token '{0}' not found in home page")]
    MissingToken(&'static str),

    #[error("unexpected response from {context}: {message}")]
    UnexpectedResponse { context: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AbraError {
    pub fn region_blocked() -> Self {
        Self::RegionBlocked {
            message: "Unable to receive a valid response from Meta AI. This is likely due to your \
                      region being blocked. Try manually accessing https://www.meta.ai/ to confirm."
                .to_string(),
        }
    }

    pub fn stream_start(detail: impl Into<String>) -> Self {
        Self::StreamStartError {
            detail: detail.into(),
        }
    }

    pub fn transport(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn unexpected(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoTerminalResponse | Self::StreamStartError { .. }
        )
    }
}
