//! Error types for value parsing

use thiserror::Error;

/// Errors from [`Color::parse`](crate::Color::parse)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ColorParseError {
    #[error("empty color string")]
    Empty,

    #[error("invalid hex color: {0}")]
    InvalidHex(String),

    #[error("invalid color function: {0}")]
    InvalidFunction(String),

    #[error("unknown color name: {0}")]
    UnknownName(String),
}
