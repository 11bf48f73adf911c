//! Animation error types

use kinetic_core::{ColorParseError, ValueKind};
use thiserror::Error;

/// Errors surfaced at the API boundary
///
/// Configuration problems are reported before anything is mutated. Frame
/// passes never return errors: a misbehaving entry is logged and isolated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimationError {
    #[error("invalid spring config: {0}")]
    InvalidConfig(String),

    #[error("invalid interpolation: {0}")]
    InvalidInterpolation(String),

    #[error("value cannot be animated: {0}")]
    UnsupportedValue(String),

    #[error("value mismatch for '{key}': expected {expected}, got {found}")]
    ValueMismatch {
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("color error: {0}")]
    Color(#[from] ColorParseError),

    #[error("controller has been destroyed")]
    ControllerDestroyed,

    #[error("animation scheduler has been dropped")]
    SchedulerDropped,

    #[error("animation script cancelled")]
    ScriptCancelled,
}

/// Result type for animation operations
pub type Result<T> = std::result::Result<T, AnimationError>;
