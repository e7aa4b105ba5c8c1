//! Error types for the growable networks
//!
//! Configuration, checkpoint and CLI code use `anyhow`; the network layer
//! reports its own failures through [`PganError`].

use thiserror::Error;

/// Errors raised by layers, blending and growth
#[derive(Error, Debug)]
pub enum PganError {
    #[error("cannot blend tensors of different shapes: old={old:?}, new={new:?}")]
    ShapeMismatch { old: Vec<i64>, new: Vec<i64> },

    #[error("transition value {0} is outside [0, 1]")]
    TransitionOutOfRange(f64),

    #[error("input resolution {actual}x{actual} does not match network resolution {expected}x{expected}")]
    ResolutionMismatch { expected: i64, actual: i64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),
}

/// Result alias for network operations
pub type Result<T> = std::result::Result<T, PganError>;
