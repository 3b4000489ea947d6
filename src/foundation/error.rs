/// Result alias used throughout the crate.
pub type VidmarkResult<T> = Result<T, VidmarkError>;

/// Errors surfaced by geometry resolution, overlay building, the media pipeline, and task control.
#[derive(thiserror::Error, Debug)]
pub enum VidmarkError {
    /// The request or a derived configuration is invalid.
    #[error("validation error: {0}")]
    Validation(String),

    /// The input container is missing, unreadable, or lacks a usable video track.
    #[error("input error: {0}")]
    Input(String),

    /// A reader or writer refused a required track configuration.
    #[error("negotiation error: {0}")]
    Negotiation(String),

    /// Pixel buffer allocation failed or the pool is exhausted.
    #[error("resource error: {0}")]
    Resource(String),

    /// The output writer failed to append or finalize.
    #[error("encode error: {0}")]
    Encode(String),

    /// The watermark image or text could not be turned into an overlay.
    #[error("overlay error: {0}")]
    Overlay(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VidmarkError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn negotiation(msg: impl Into<String>) -> Self {
        Self::Negotiation(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn overlay(msg: impl Into<String>) -> Self {
        Self::Overlay(msg.into())
    }

    /// Stable caller-facing code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Encode(_) => ErrorCode::EncodeFailed,
            Self::Validation(_)
            | Self::Input(_)
            | Self::Negotiation(_)
            | Self::Resource(_)
            | Self::Overlay(_)
            | Self::Other(_) => ErrorCode::ComposeFailed,
        }
    }
}

/// Error codes reported through the task callback contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Setup, negotiation, resource, or overlay failure.
    ComposeFailed,
    /// The output writer failed while appending or finalizing.
    EncodeFailed,
    /// The task was cancelled by the caller.
    Cancelled,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ComposeFailed => "compose_failed",
            Self::EncodeFailed => "encode_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
