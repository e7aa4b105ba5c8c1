//! Linear fade between the old and the new topology of a growing network

use tch::Tensor;

use crate::error::{PganError, Result};

/// Reject transition values outside [0, 1]
pub fn check_transition(transition: f64) -> Result<()> {
    if (0.0..=1.0).contains(&transition) {
        Ok(())
    } else {
        Err(PganError::TransitionOutOfRange(transition))
    }
}

/// `(1 - t) * old + t * new`, elementwise.
///
/// At `t = 0` the result is `old` and at `t = 1` it is `new`, so a freshly
/// grown network behaves exactly like its predecessor until the training
/// loop starts moving `t`.
///
/// # Errors
///
/// [`PganError::ShapeMismatch`] when the two paths disagree on shape and
/// [`PganError::TransitionOutOfRange`] when `t` is outside [0, 1].
pub fn blend(old: &Tensor, new: &Tensor, transition: f64) -> Result<Tensor> {
    check_transition(transition)?;

    let (old_size, new_size) = (old.size(), new.size());
    if old_size != new_size {
        return Err(PganError::ShapeMismatch {
            old: old_size,
            new: new_size,
        });
    }

    Ok(old * (1.0 - transition) + new * transition)
}
