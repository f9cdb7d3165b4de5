//! Common error types for flash operations

use core::fmt;

/// Flash operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// Invalid parameter provided
    InvalidParameter,
    /// Operation not supported by this device
    NotSupported,
    /// Security register number or address out of range
    OutOfRange,
    /// Operation timed out
    Timeout,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::OutOfRange => write!(f, "out of range"),
            Self::Timeout => write!(f, "operation timeout"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FlashError {}

/// Result type for flash operations
pub type FlashResult<T> = Result<T, FlashError>;
