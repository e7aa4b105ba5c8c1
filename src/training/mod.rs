//! Training support for progressive growth
//!
//! This module provides:
//! - Transition schedule turning images seen into a fade-in value
//! - Gradient sanitation checks used to skip optimizer steps

mod schedule;
mod sanitize;

pub use sanitize::{finite_check, has_inf, has_nan};
pub use schedule::{GrowthPhase, TransitionSchedule};
