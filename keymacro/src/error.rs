use std::path::PathBuf;
use thiserror::Error;

use crate::item::MacroAction;

/// Error types for macro loading, recording and playback
#[derive(Debug, Error)]
pub enum MacroError {
    /// The macro file does not exist
    #[error("Macro file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A sequence without a target window, a file without a Target line,
    /// or a recorder used in the wrong state
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A macro line could not be understood
    #[error("Parse error on line {line}: {kind}")]
    ParseError { line: usize, kind: ParseErrorKind },

    /// Window lookup, foreground switch, coordinate translation or injection failed
    #[error("{operation} failed (platform error {code})")]
    PlatformError { operation: String, code: i32 },

    /// No input backend exists for this platform
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Error when serializing recorded events
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// What went wrong on a single macro line
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unsupported macro action '{0}'")]
    UnsupportedAction(String),

    #[error("invalid parameters for {action}: {reason}")]
    InvalidParameters { action: MacroAction, reason: String },
}

impl MacroError {
    pub(crate) fn platform(operation: impl Into<String>, code: i32) -> Self {
        Self::PlatformError {
            operation: operation.into(),
            code,
        }
    }

    /// The platform error code carried by this error, 0 for every other kind
    pub fn platform_code(&self) -> i32 {
        match self {
            Self::PlatformError { code, .. } => *code,
            _ => 0,
        }
    }
}

/// Result type for macro operations
pub type Result<T> = std::result::Result<T, MacroError>;
