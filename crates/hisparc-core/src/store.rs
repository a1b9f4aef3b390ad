use crate::error::ShowerResult;
use crate::event::{Coincidence, Observable, ReconstructedEvent, Reconstruction, Shower};

/// Simulated zenith angles closer than this are the same variant. The
/// simulations store zenith as single-precision floats.
pub const ZENITH_TOLERANCE: f64 = 1e-6;

/// Simulated showers, grouped by simulation name.
pub trait ShowerStore {
    // Write
    fn add_shower(&self, simulation: &str, name: &str) -> ShowerResult<i64>;
    fn insert_observables(&self, shower_id: i64, events: &[Observable]) -> ShowerResult<usize>;
    fn insert_coincidences(&self, shower_id: i64, events: &[Coincidence]) -> ShowerResult<usize>;
    /// Add a shower with its observables and coincidences. Nothing is kept
    /// when any of the writes fails.
    fn import_shower(
        &self,
        simulation: &str,
        name: &str,
        observables: &[Observable],
        coincidences: &[Coincidence],
    ) -> ShowerResult<i64>;

    // Read
    fn list_simulations(&self) -> ShowerResult<Vec<(String, usize)>>;
    fn list_showers(&self, simulation: &str) -> ShowerResult<Vec<Shower>>;
    /// Observables in table order, at most `limit` rows.
    fn observables(&self, shower_id: i64, limit: Option<usize>) -> ShowerResult<Vec<Observable>>;
    /// Coincidences in table order, parallel to [`ShowerStore::observables`].
    fn coincidences(&self, shower_id: i64, limit: Option<usize>) -> ShowerResult<Vec<Coincidence>>;
}

/// Reconstruction result tables.
pub trait ReconstructionStore {
    fn has_reconstruction(&self, name: &str) -> ShowerResult<bool>;
    fn get_reconstruction(&self, name: &str) -> ShowerResult<Option<Reconstruction>>;
    fn list_reconstructions(&self) -> ShowerResult<Vec<Reconstruction>>;
    /// Create an empty table, discarding any previous table of that name.
    fn create_reconstruction(&self, name: &str, description: &str) -> ShowerResult<()>;
    /// Drop a table and its rows. Returns whether it existed.
    fn delete_reconstruction(&self, name: &str) -> ShowerResult<bool>;
    fn append_events(&self, name: &str, events: &[ReconstructedEvent]) -> ShowerResult<usize>;
    fn read_events(&self, name: &str, filter: &EventFilter) -> ShowerResult<Vec<ReconstructedEvent>>;
    fn count_events(&self, name: &str) -> ShowerResult<usize>;
}

/// Pulse integrals per station, the input of the spectrum fit.
pub trait PulseStore {
    fn insert_pulse_integrals(&self, station: u32, integrals: &[f64]) -> ShowerResult<usize>;
    fn pulse_integrals(&self, station: u32) -> ShowerResult<Vec<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DensityCut {
    Exactly(u16),
    AtLeast(u16),
}

/// Selection over a reconstruction table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub density: Option<DensityCut>,
    pub sim_theta: Option<f64>,
    pub size: Option<u8>,
    pub bin: Option<f64>,
    pub bin_r: Option<bool>,
    /// Core distance range `(lo, hi]`.
    pub core_distance: Option<(f64, f64)>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn density(mut self, cut: DensityCut) -> Self {
        self.density = Some(cut);
        self
    }

    pub fn zenith(mut self, theta: f64) -> Self {
        self.sim_theta = Some(theta);
        self
    }

    pub fn size(mut self, size: u8) -> Self {
        self.size = Some(size);
        self
    }

    pub fn bin(mut self, width: f64) -> Self {
        self.bin = Some(width);
        self
    }

    pub fn randomized(mut self, bin_r: bool) -> Self {
        self.bin_r = Some(bin_r);
        self
    }

    pub fn core_distance(mut self, lo: f64, hi: f64) -> Self {
        self.core_distance = Some((lo, hi));
        self
    }

    pub fn matches(&self, event: &ReconstructedEvent) -> bool {
        let density_ok = match self.density {
            Some(DensityCut::Exactly(d)) => event.density == d,
            Some(DensityCut::AtLeast(d)) => event.density >= d,
            None => true,
        };
        density_ok
            && self
                .sim_theta
                .map_or(true, |t| (event.sim_theta - t).abs() < ZENITH_TOLERANCE)
            && self.size.map_or(true, |s| event.size == s)
            && self.bin.map_or(true, |b| event.bin == b)
            && self.bin_r.map_or(true, |b| event.bin_r == b)
            && self
                .core_distance
                .map_or(true, |(lo, hi)| lo < event.r && event.r <= hi)
    }
}
