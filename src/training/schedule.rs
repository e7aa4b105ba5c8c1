//! Transition schedule for progressive growth
//!
//! Each resolution goes through a transition phase, where the newest stage is
//! faded in linearly, followed by a stable phase at full strength. Once both
//! phases are over the networks should be grown again.

use serde::{Deserialize, Serialize};

/// Where a resolution is in its life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthPhase {
    /// Newest stage is still fading in
    Transition,
    /// Newest stage is at full strength
    Stable,
    /// Both phases are done; time to extend
    Grow,
}

/// Number of images shown during each phase of one resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSchedule {
    pub transition_images: u64,
    pub stable_images: u64,
}

impl Default for TransitionSchedule {
    fn default() -> Self {
        Self {
            transition_images: 600_000,
            stable_images: 600_000,
        }
    }
}

impl TransitionSchedule {
    pub fn new(transition_images: u64, stable_images: u64) -> Self {
        Self {
            transition_images,
            stable_images,
        }
    }

    /// Transition value after `images_seen` images at the current resolution.
    ///
    /// Ramps linearly from 0 to 1 over the transition phase and stays at 1.
    pub fn progress(&self, images_seen: u64) -> f64 {
        if self.transition_images == 0 || images_seen >= self.transition_images {
            1.0
        } else {
            images_seen as f64 / self.transition_images as f64
        }
    }

    pub fn phase(&self, images_seen: u64) -> GrowthPhase {
        if images_seen < self.transition_images {
            GrowthPhase::Transition
        } else if images_seen < self.transition_images + self.stable_images {
            GrowthPhase::Stable
        } else {
            GrowthPhase::Grow
        }
    }

    pub fn should_grow(&self, images_seen: u64) -> bool {
        self.phase(images_seen) == GrowthPhase::Grow
    }
}
