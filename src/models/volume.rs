//! Volume: the work-content magnitude of a process.
//!
//! Volumes below [`MIN_VOLUME`] are treated as exactly zero. Rework
//! volumes typically decay geometrically, so without a floor a feedback
//! loop would approach zero asymptotically and never finish; the
//! epsilon cuts that tail off and keeps the reachable state space
//! finite.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Smallest representable non-zero volume. Anything below snaps to zero.
pub const MIN_VOLUME: f64 = 1e-3;

/// A non-negative work magnitude with epsilon-to-zero semantics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(f64);

impl Volume {
    /// Exactly zero.
    pub const ZERO: Volume = Volume(0.0);

    /// Creates a volume, snapping sub-epsilon and negative values to zero.
    pub fn new(value: f64) -> Self {
        if value < MIN_VOLUME {
            Volume(0.0)
        } else {
            Volume(value)
        }
    }

    /// The raw magnitude.
    pub fn get(self) -> f64 {
        self.0
    }

    /// Whether this volume is exactly zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }

    /// Subtracts `amount`, snapping to zero at or below the epsilon.
    pub fn consume(self, amount: f64) -> Self {
        Volume::new(self.0 - amount)
    }

    /// Time to drain this volume at `rate` volume per unit time.
    ///
    /// Returns `None` for zero volume or a non-positive rate.
    pub fn time_to_zero(self, rate: f64) -> Option<f64> {
        if self.is_zero() || rate <= 0.0 {
            None
        } else {
            Some(self.0 / rate)
        }
    }
}

impl PartialEq for Volume {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Volume {}

impl PartialOrd for Volume {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Volume {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Volume {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Normalize -0.0 so equal volumes hash equally.
        let bits = if self.0 == 0.0 { 0u64 } else { self.0.to_bits() };
        bits.hash(state);
    }
}

impl std::iter::Sum for Volume {
    fn sum<I: Iterator<Item = Volume>>(iter: I) -> Self {
        Volume::new(iter.map(|v| v.0).sum())
    }
}

/// Exponential-decay rework volume with the epsilon floor.
///
/// `rework_volume(initial, ratio, 0)` is the initial volume itself;
/// for n ≥ 1 it is `max(initial · ratioⁿ, MIN_VOLUME)`. Models rework
/// iterations taking geometrically less effort, floored so that a
/// bounded number of iterations always drains the loop.
pub fn exponential_rework(initial: f64, ratio: f64, completions: u32) -> Volume {
    if completions == 0 {
        return Volume::new(initial);
    }
    let decayed = initial * ratio.powi(completions as i32);
    Volume(decayed.max(MIN_VOLUME))
}
