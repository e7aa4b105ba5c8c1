//! Gradient sanitation
//!
//! Non-finite gradients are reported as a plain `bool` so the training loop
//! can decide to skip an optimizer step instead of unwinding.

use tch::Tensor;

/// True if any element is NaN
pub fn has_nan(tensor: &Tensor) -> bool {
    tensor.isnan().any().int64_value(&[]) != 0
}

/// True if any element is +inf or -inf
pub fn has_inf(tensor: &Tensor) -> bool {
    tensor.isinf().any().int64_value(&[]) != 0
}

/// Check that every defined gradient of `parameters` is finite.
///
/// Parameters without a gradient (unused this step, or dropped from the
/// topology by growth) are skipped.
pub fn finite_check(parameters: &[Tensor]) -> bool {
    parameters
        .iter()
        .map(|p| p.grad())
        .filter(|grad| grad.defined())
        .all(|grad| !has_inf(&grad) && !has_nan(&grad))
}
