use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Arrival times at or below this value mark a station without a signal.
pub const NO_SIGNAL: f64 = -999.0;

/// A simulated shower: one observables table and its coincidence table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shower {
    pub id: i64,
    /// Simulation group, e.g. `zenith_22_5` or `zenith_22_5_size5`.
    pub simulation: String,
    pub name: String,
}

/// What the four detectors recorded for one shower placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observable {
    pub id: u32,
    /// Arrival times in ns, one per station.
    pub t: [f64; 4],
    /// Particle counts, one per station.
    pub n: [u16; 4],
    pub r: f64,
    pub phi: f64,
    pub alpha: f64,
}

impl Observable {
    /// Smallest particle count over the stations the reconstruction uses.
    /// Station 2 only contributes its arrival time and is not part of the
    /// density cut.
    pub fn min_density(&self) -> u16 {
        self.n[0].min(self.n[2]).min(self.n[3])
    }

    pub fn has_signal(&self, station: usize) -> bool {
        self.t[station - 1] > NO_SIGNAL
    }
}

/// Ground truth for one shower placement: core position relative to the
/// cluster and the shower azimuth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coincidence {
    pub id: u32,
    pub r: f64,
    pub phi: f64,
    pub alpha: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowerEvent {
    pub observable: Observable,
    pub coincidence: Coincidence,
}

/// One row of a reconstruction table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedEvent {
    pub r: f64,
    pub phi: f64,
    pub alpha: f64,
    pub t: [f64; 4],
    pub n: [u16; 4],
    pub sim_theta: f64,
    pub sim_phi: f64,
    pub r_theta: f64,
    pub r_phi: f64,
    /// Minimum particle count over stations 1, 3 and 4.
    #[serde(rename = "D")]
    pub density: u16,
    /// Station size (m) used for this reconstruction.
    pub size: u8,
    /// Time bin width in ns, 0 when unbinned.
    pub bin: f64,
    /// Whether arrival times were dithered within their bin.
    pub bin_r: bool,
}

impl ReconstructedEvent {
    pub fn theta_error(&self) -> f64 {
        wrap_angle(self.sim_theta - self.r_theta)
    }

    pub fn phi_error(&self) -> f64 {
        wrap_angle(self.sim_phi - self.r_phi)
    }
}

/// Catalog entry for a reconstruction table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconstruction {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Map an angle difference into `[-π, π)`.
pub fn wrap_angle(x: f64) -> f64 {
    use std::f64::consts::PI;
    (x + PI).rem_euclid(2.0 * PI) - PI
}
