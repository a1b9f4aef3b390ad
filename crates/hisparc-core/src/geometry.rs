//! Detector station layout and the pairwise bearings the reconstruction
//! formulas are built on.
//!
//! Stations are numbered from 1, matching the `t1..t4` / `n1..n4` columns of
//! the event tables. The reconstruction uses station 1 as the reference and
//! stations 3 and 4 as the comparison detectors.

use serde::{Deserialize, Serialize};

use crate::error::{ShowerError, ShowerResult};

/// Nominal distance between the reference station and the two comparison
/// stations, in meters.
pub const DEFAULT_STATION_SIZE: f64 = 10.0;

/// Station used as the timing reference.
pub const REFERENCE_STATION: usize = 1;

/// The two stations whose timing is compared against the reference.
pub const COMPARISON_STATIONS: (usize, usize) = (3, 4);

/// Planar position of a detector, in meters relative to the cluster origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub x: f64,
    pub y: f64,
}

impl Station {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A fixed set of detector stations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorLayout {
    stations: Vec<Station>,
}

impl Default for DetectorLayout {
    fn default() -> Self {
        Self {
            stations: vec![
                Station::new(0.0, 5.77),
                Station::new(0.0, 0.0),
                Station::new(-5.0, -2.89),
                Station::new(5.0, -2.89),
            ],
        }
    }
}

impl DetectorLayout {
    pub fn new(stations: Vec<Station>) -> ShowerResult<Self> {
        let needed = REFERENCE_STATION
            .max(COMPARISON_STATIONS.0)
            .max(COMPARISON_STATIONS.1);
        if stations.len() < needed {
            return Err(ShowerError::Config(format!(
                "detector layout needs at least {needed} stations, got {}",
                stations.len()
            )));
        }
        Ok(Self { stations })
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn station(&self, number: usize) -> ShowerResult<Station> {
        number
            .checked_sub(1)
            .and_then(|i| self.stations.get(i))
            .copied()
            .ok_or(ShowerError::InvalidStation(number))
    }

    /// Angle of the vector pointing from station `from` to station `to`, in
    /// `(-π, π]`.
    pub fn bearing(&self, from: usize, to: usize) -> ShowerResult<f64> {
        let a = self.station(from)?;
        let b = self.station(to)?;
        Ok((b.y - a.y).atan2(b.x - a.x))
    }

    /// Bearings from the reference station to both comparison stations, with
    /// both separations set to `station_size`.
    pub fn geometry(&self, station_size: f64) -> ShowerResult<ReconstructionGeometry> {
        Ok(ReconstructionGeometry {
            phi1: self.bearing(REFERENCE_STATION, COMPARISON_STATIONS.0)?,
            phi2: self.bearing(REFERENCE_STATION, COMPARISON_STATIONS.1)?,
            r1: station_size,
            r2: station_size,
        })
    }
}

/// The constants every reconstruction and error-model formula needs,
/// computed once per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconstructionGeometry {
    /// Bearing from the reference station to the first comparison station.
    pub phi1: f64,
    /// Bearing from the reference station to the second comparison station.
    pub phi2: f64,
    pub r1: f64,
    pub r2: f64,
}

impl ReconstructionGeometry {
    /// Same bearings, different station size.
    pub fn with_size(self, station_size: f64) -> Self {
        Self {
            r1: station_size,
            r2: station_size,
            ..self
        }
    }
}

impl Default for ReconstructionGeometry {
    fn default() -> Self {
        // The default layout always has the stations the reconstruction uses.
        let layout = DetectorLayout::default();
        let bearing = |to: usize| {
            let a = layout.stations[REFERENCE_STATION - 1];
            let b = layout.stations[to - 1];
            (b.y - a.y).atan2(b.x - a.x)
        };
        Self {
            phi1: bearing(COMPARISON_STATIONS.0),
            phi2: bearing(COMPARISON_STATIONS.1),
            r1: DEFAULT_STATION_SIZE,
            r2: DEFAULT_STATION_SIZE,
        }
    }
}
