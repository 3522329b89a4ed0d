//! Error handling for Slowverb
//!
//! Every core operation returns either a value or one of these tagged errors.
//! Each error carries a stable code and recovery suggestions for display.

use thiserror::Error;

/// Result type alias for Slowverb operations
pub type Result<T> = std::result::Result<T, SlowverbError>;

/// Boxed source error from an external decoder/encoder
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for Slowverb operations
#[derive(Error, Debug)]
pub enum SlowverbError {
    // Parameter Errors
    #[error("Invalid parameter '{field}': {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("Unsupported reverb type: {name}")]
    UnsupportedReverbType { name: String },

    // Input Errors
    #[error("Input file not found: {path}")]
    InputNotFound { path: String },

    #[error("Input file too large: {path} is {size_bytes} bytes (limit {limit_bytes} bytes)")]
    InputTooLarge {
        path: String,
        size_bytes: u64,
        limit_bytes: u64,
    },

    // Codec Errors
    #[error("Failed to decode audio: {reason}")]
    DecodeFailure {
        reason: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Failed to encode audio: {reason}")]
    EncodeFailure {
        reason: String,
        #[source]
        source: Option<BoxedSource>,
    },

    // Playback Errors
    #[error("Playback is already in progress")]
    AlreadyPlaying,

    #[error("Audio output device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    // Configuration Errors
    #[error("Invalid configuration at {path}: {reason}")]
    Config { path: String, reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlowverbError {
    /// Shorthand for an `InvalidParameter` error
    pub fn invalid_parameter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SlowverbError::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a `DecodeFailure` with an underlying cause
    pub fn decode<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SlowverbError::DecodeFailure {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Shorthand for an `EncodeFailure` with an underlying cause
    pub fn encode<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SlowverbError::EncodeFailure {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            SlowverbError::InvalidParameter { .. } => "INVALID_PARAMETER",
            SlowverbError::UnsupportedReverbType { .. } => "UNSUPPORTED_REVERB_TYPE",
            SlowverbError::InputNotFound { .. } => "INPUT_NOT_FOUND",
            SlowverbError::InputTooLarge { .. } => "INPUT_TOO_LARGE",
            SlowverbError::DecodeFailure { .. } => "DECODE_FAILURE",
            SlowverbError::EncodeFailure { .. } => "ENCODE_FAILURE",
            SlowverbError::AlreadyPlaying => "ALREADY_PLAYING",
            SlowverbError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            SlowverbError::Config { .. } => "CONFIG_ERROR",
            SlowverbError::Io(_) => "IO_ERROR",
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            SlowverbError::InvalidParameter { .. } => vec![
                "Slowdown factor must be above 0 and at most 2.0",
                "Reverb duration must be a positive number of milliseconds",
                "Reverb decay must be between 0 and 1",
            ],
            SlowverbError::UnsupportedReverbType { .. } => {
                vec!["Supported reverb types: sine, silent (alias: convolution)"]
            }
            SlowverbError::InputNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            SlowverbError::InputTooLarge { .. } => vec![
                "Trim the recording into shorter parts",
                "Raise limits.max_input_bytes in the configuration file",
            ],
            SlowverbError::DecodeFailure { .. } => vec![
                "Check if the file plays in another application",
                "Try converting the file to WAV first",
            ],
            SlowverbError::EncodeFailure { .. } => vec![
                "Export to a .wav file",
                "Check the output location is writable",
            ],
            SlowverbError::AlreadyPlaying => vec!["Stop the current preview before starting another"],
            SlowverbError::DeviceUnavailable { .. } => vec![
                "Check an output device is connected",
                "Close other applications holding the audio device",
            ],
            _ => vec![],
        }
    }
}
