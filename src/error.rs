use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceboxError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Failed to decode audio unit {index}: {message}")]
    Decode { index: usize, message: String },

    #[error("Audio processing failed: {0}")]
    Audio(String),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("No audio was produced. Please check your input text.")]
    NoAudioProduced,

    #[error("Generation cancelled")]
    Cancelled,

    #[error("A generation run is already in progress")]
    RunInProgress,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VoiceboxError {
    /// True for errors the user fixes by correcting input or settings.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            VoiceboxError::InvalidInput(_)
                | VoiceboxError::UnsupportedFormat(_)
                | VoiceboxError::Config(_)
                | VoiceboxError::Synthesis(SynthesisError::InvalidInput(_))
        )
    }
}

/// Failures of a single text-to-speech request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    TransientNetwork(String),

    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SynthesisError {
    /// Connection-level failures and timeouts may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SynthesisError::Timeout(_) | SynthesisError::TransientNetwork(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VoiceboxError>;
