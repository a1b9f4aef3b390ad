//! Time quantisation of arrival times, emulating a digitiser with a finite
//! sample period.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    /// Bin width in ns.
    pub width: f64,
    /// Add a uniform offset in `[0, width)` after quantising.
    #[serde(default)]
    pub randomize: bool,
}

impl Binning {
    pub fn new(width: f64) -> Self {
        Self {
            width,
            randomize: false,
        }
    }

    pub fn randomized(width: f64) -> Self {
        Self {
            width,
            randomize: true,
        }
    }

    /// A width that is not strictly positive means no binning.
    pub fn is_active(&self) -> bool {
        self.width > 0.0 && self.width.is_finite()
    }

    /// Quantise `times` in place. Inactive binning leaves them unchanged.
    pub fn apply<R: Rng + ?Sized>(&self, times: &mut [f64], rng: &mut R) {
        if !self.is_active() {
            return;
        }
        for t in times.iter_mut() {
            *t = quantize(*t, self.width);
            if self.randomize {
                *t += rng.random_range(0.0..self.width);
            }
        }
    }
}

/// Floor `t` to a multiple of `width`.
pub fn quantize(t: f64, width: f64) -> f64 {
    (t / width).floor() * width
}
