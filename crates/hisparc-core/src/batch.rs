//! Batch reconstruction of simulated showers into a reconstruction table.

use std::f64::consts::PI;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::binning::Binning;
use crate::direction::reconstruct_event;
use crate::error::{ShowerError, ShowerResult};
use crate::event::{Coincidence, Observable, ReconstructedEvent};
use crate::geometry::{
    DetectorLayout, ReconstructionGeometry, COMPARISON_STATIONS, DEFAULT_STATION_SIZE,
    REFERENCE_STATION,
};
use crate::store::{ReconstructionStore, ShowerStore};

/// One pass over a simulation group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionRun {
    /// Simulation group, e.g. `zenith_22_5`; a `_size<N>` suffix selects an
    /// `N` m station.
    pub simulation: String,
    /// Simulated zenith angle in radians.
    pub zenith: f64,
    /// Minimum particle count on stations 1, 3 and 4.
    pub min_density: u16,
    #[serde(default)]
    pub binning: Option<Binning>,
    /// Only read the first `limit` events of each shower.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ReconstructionRun {
    pub fn new(simulation: impl Into<String>, zenith: f64, min_density: u16) -> Self {
        Self {
            simulation: simulation.into(),
            zenith,
            min_density,
            binning: None,
            limit: None,
        }
    }

    pub fn with_binning(mut self, binning: Binning) -> Self {
        self.binning = Some(binning);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Counts for one run. Events that pass the density cut but have no valid
/// direction are dropped without being recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub simulation: String,
    pub showers: usize,
    pub events: usize,
    pub passed_cut: usize,
    pub recorded: usize,
}

impl RunSummary {
    pub fn dropped_invalid(&self) -> usize {
        self.passed_cut - self.recorded
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FullReconstruction {
    /// The table already existed and no recompute was requested.
    Skipped,
    Completed(Vec<RunSummary>),
}

/// Station size encoded in a simulation name (`zenith_22_5_size20` → 20),
/// 10 m when absent.
pub fn station_size(simulation: &str) -> ShowerResult<u8> {
    let Some(pos) = simulation.find("_size") else {
        return Ok(DEFAULT_STATION_SIZE as u8);
    };
    let digits: String = simulation[pos + "_size".len()..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return Ok(DEFAULT_STATION_SIZE as u8);
    }
    digits
        .parse()
        .map_err(|_| ShowerError::InvalidInput(format!("station size in {simulation}")))
}

/// The variants of the full HiSPARC reconstruction: four zenith angles, two
/// station sizes and three bin widths with and without dithering.
pub fn default_plan(min_density: u16) -> Vec<ReconstructionRun> {
    let d = min_density;
    let mut plan = vec![
        ReconstructionRun::new("zenith_0", 0.0, d),
        ReconstructionRun::new("zenith_5", 5f64.to_radians(), d),
        ReconstructionRun::new("zenith_22_5", PI / 8.0, d),
        ReconstructionRun::new("zenith_35", 35f64.to_radians(), d),
        ReconstructionRun::new("zenith_22_5_size5", PI / 8.0, d),
        ReconstructionRun::new("zenith_22_5_size20", PI / 8.0, d),
    ];
    for randomize in [false, true] {
        for width in [1.0, 2.5, 5.0] {
            plan.push(
                ReconstructionRun::new("zenith_22_5", PI / 8.0, d)
                    .with_binning(Binning { width, randomize }),
            );
        }
    }
    plan
}

/// Apply the density cut, optional binning and the reconstruction to one
/// event. `None` when the event is cut or has no valid direction.
pub fn reconstruct_one<R: Rng + ?Sized>(
    observable: &Observable,
    coincidence: &Coincidence,
    run: &ReconstructionRun,
    geometry: &ReconstructionGeometry,
    size: u8,
    rng: &mut R,
) -> Option<ReconstructedEvent> {
    let density = observable.min_density();
    if density < run.min_density {
        return None;
    }

    let stations = [REFERENCE_STATION, COMPARISON_STATIONS.0, COMPARISON_STATIONS.1];
    if let Some(&missing) = stations.iter().find(|&&s| !observable.has_signal(s)) {
        debug!(event = observable.id, station = missing, "no signal, skipping event");
        return None;
    }

    let binning = run.binning.filter(Binning::is_active);
    let mut event = observable.clone();
    if let Some(binning) = &binning {
        binning.apply(&mut event.t, rng);
    }

    let direction = reconstruct_event(&event, geometry);
    if !direction.is_valid() {
        return None;
    }

    Some(ReconstructedEvent {
        r: coincidence.r,
        phi: coincidence.phi,
        alpha: event.alpha,
        t: event.t,
        n: event.n,
        sim_theta: run.zenith,
        sim_phi: coincidence.alpha,
        r_theta: direction.theta,
        r_phi: direction.phi,
        density,
        size,
        bin: binning.map_or(0.0, |b| b.width),
        bin_r: binning.is_some_and(|b| b.randomize),
    })
}

/// Reconstruct every shower of `run.simulation` and append the valid results
/// to the reconstruction table `dest`, which must exist.
pub fn reconstruct_angles<S, R>(
    store: &S,
    dest: &str,
    run: &ReconstructionRun,
    layout: &DetectorLayout,
    rng: &mut R,
) -> ShowerResult<RunSummary>
where
    S: ShowerStore + ReconstructionStore + ?Sized,
    R: Rng + ?Sized,
{
    let size = station_size(&run.simulation)?;
    let geometry = layout.geometry(f64::from(size))?;

    let showers = store.list_showers(&run.simulation)?;
    if showers.is_empty() {
        warn!(simulation = %run.simulation, "no showers in simulation group");
    }

    let mut summary = RunSummary {
        simulation: run.simulation.clone(),
        showers: showers.len(),
        ..RunSummary::default()
    };

    for shower in &showers {
        let observables = store.observables(shower.id, run.limit)?;
        let coincidences = store.coincidences(shower.id, run.limit)?;

        let mut rows = Vec::with_capacity(observables.len());
        for (observable, coincidence) in observables.iter().zip(&coincidences) {
            if observable.id != coincidence.id {
                return Err(ShowerError::EventMismatch {
                    expected: coincidence.id,
                    found: observable.id,
                });
            }
            summary.events += 1;
            if observable.min_density() >= run.min_density {
                summary.passed_cut += 1;
            }
            if let Some(row) =
                reconstruct_one(observable, coincidence, run, &geometry, size, rng)
            {
                rows.push(row);
            }
        }

        summary.recorded += store.append_events(dest, &rows)?;
        debug!(shower = %shower.name, recorded = rows.len(), "reconstructed shower");
    }

    info!(
        simulation = %run.simulation,
        zenith = run.zenith.to_degrees(),
        size,
        bin = run.binning.map_or(0.0, |b| b.width),
        events = summary.events,
        recorded = summary.recorded,
        dropped = summary.dropped_invalid(),
        "reconstruction run finished"
    );
    Ok(summary)
}

/// Run the whole `plan` into a fresh reconstruction table `name`.
///
/// An existing table is kept as is unless `recompute` is set, in which case
/// it is replaced.
pub fn do_full_reconstruction<S, R>(
    store: &S,
    name: &str,
    plan: &[ReconstructionRun],
    layout: &DetectorLayout,
    recompute: bool,
    rng: &mut R,
) -> ShowerResult<FullReconstruction>
where
    S: ShowerStore + ReconstructionStore + ?Sized,
    R: Rng + ?Sized,
{
    if store.has_reconstruction(name)? && !recompute {
        info!(reconstruction = name, "reconstruction exists, skipping");
        return Ok(FullReconstruction::Skipped);
    }

    store.create_reconstruction(name, "Reconstruction data")?;
    let mut summaries = Vec::with_capacity(plan.len());
    for run in plan {
        match reconstruct_angles(store, name, run, layout, rng) {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                // A partial table must not pass for a finished one.
                warn!(reconstruction = name, simulation = %run.simulation, error = %e,
                    "reconstruction failed, dropping table");
                if let Err(cleanup) = store.delete_reconstruction(name) {
                    warn!(reconstruction = name, error = %cleanup, "could not drop table");
                }
                return Err(e);
            }
        }
    }
    Ok(FullReconstruction::Completed(summaries))
}
