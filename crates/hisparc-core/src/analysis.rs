//! Reconstruction quality: measured angle spreads against the analytic
//! estimates, and the reconstruction efficiency as a function of core
//! distance.

use std::collections::HashMap;
use std::f64::consts::PI;

use serde::Serialize;
use statrs::statistics::Statistics;

use crate::error::ShowerResult;
use crate::error_model::{
    linspace, mean_over_azimuth, relative_azimuth_error_sq, relative_theta_error_sq, ErrorModel,
};
use crate::event::ReconstructedEvent;
use crate::geometry::{ReconstructionGeometry, DEFAULT_STATION_SIZE};
use crate::store::{DensityCut, EventFilter, ReconstructionStore, ShowerStore};
use crate::timing::std_t;

/// Zenith angles of the simulation variants.
pub const ZENITH_VARIANTS: [f64; 4] = [0.0, 5.0 * PI / 180.0, PI / 8.0, 35.0 * PI / 180.0];

const REFERENCE_ZENITH: f64 = PI / 8.0;
const REFERENCE_DENSITY: u16 = 2;

/// Measured spread of the reconstruction errors at one setting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadPoint {
    pub x: f64,
    pub count: usize,
    pub theta_std: f64,
    pub phi_std: f64,
}

/// Analytic uncertainty at one setting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimatePoint {
    pub x: f64,
    pub theta: f64,
    pub phi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UncertaintyCurve {
    pub parameter: &'static str,
    pub measured: Vec<SpreadPoint>,
    pub estimate: Vec<EstimatePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreDistancePoint {
    pub density: u16,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyPoint {
    pub r_lo: f64,
    pub r_hi: f64,
    pub efficiency: f64,
}

/// Population standard deviations of the wrapped zenith and azimuth errors.
/// NaN for an empty selection.
pub fn angle_spread(events: &[ReconstructedEvent]) -> (f64, f64) {
    let theta: Vec<f64> = events.iter().map(ReconstructedEvent::theta_error).collect();
    let phi: Vec<f64> = events.iter().map(ReconstructedEvent::phi_error).collect();
    (theta.population_std_dev(), phi.population_std_dev())
}

/// Azimuth-averaged squared errors `(theta, phi)` per unit timing variance.
fn mean_relative_errors_sq(theta: f64, geometry: &ReconstructionGeometry) -> (f64, f64) {
    (
        mean_over_azimuth(|p| relative_theta_error_sq(theta, p, geometry)),
        mean_over_azimuth(|p| relative_azimuth_error_sq(theta, p, geometry)),
    )
}

/// Azimuth-averaged squared errors `(theta, phi)` at the model's timing
/// error.
fn mean_errors_sq(model: &ErrorModel, theta: f64, geometry: &ReconstructionGeometry) -> (f64, f64) {
    (
        mean_over_azimuth(|p| model.theta_error_sq(theta, p, geometry)),
        mean_over_azimuth(|p| model.azimuth_error_sq(theta, p, geometry)),
    )
}

/// Uncertainty analyses over one reconstruction table.
pub struct UncertaintyAnalysis<'a, S: ReconstructionStore + ?Sized> {
    store: &'a S,
    name: &'a str,
    geometry: ReconstructionGeometry,
    model: ErrorModel,
}

impl<'a, S: ReconstructionStore + ?Sized> UncertaintyAnalysis<'a, S> {
    pub fn new(
        store: &'a S,
        name: &'a str,
        geometry: ReconstructionGeometry,
        model: ErrorModel,
    ) -> Self {
        Self {
            store,
            name,
            geometry: geometry.with_size(DEFAULT_STATION_SIZE),
            model,
        }
    }

    fn spread(&self, x: f64, filter: &EventFilter) -> ShowerResult<SpreadPoint> {
        let events = self.store.read_events(self.name, filter)?;
        let (theta_std, phi_std) = angle_spread(&events);
        Ok(SpreadPoint {
            x,
            count: events.len(),
            theta_std,
            phi_std,
        })
    }

    fn reference_filter(&self) -> EventFilter {
        EventFilter::new()
            .density(DensityCut::Exactly(REFERENCE_DENSITY))
            .zenith(REFERENCE_ZENITH)
            .size(DEFAULT_STATION_SIZE as u8)
            .bin(0.0)
    }

    /// Spread against the minimum particle count, zenith 22.5°.
    pub fn vs_density(&self) -> ShowerResult<UncertaintyCurve> {
        let mut measured = Vec::new();
        for d in 1..=5u16 {
            let filter = EventFilter::new()
                .density(DensityCut::Exactly(d))
                .zenith(REFERENCE_ZENITH)
                .size(DEFAULT_STATION_SIZE as u8)
                .bin(0.0)
                .core_distance(0.0, 100.0);
            measured.push(self.spread(f64::from(d), &filter)?);
        }

        let (theta_sq, phi_sq) = mean_errors_sq(&self.model, REFERENCE_ZENITH, &self.geometry);
        let estimate = linspace(1.0, 5.0, 50)
            .into_iter()
            .map(|n| {
                let s = std_t(n);
                EstimatePoint {
                    x: n,
                    theta: s * theta_sq.sqrt(),
                    phi: s * phi_sq.sqrt(),
                }
            })
            .collect();

        Ok(UncertaintyCurve {
            parameter: "min_particles",
            measured,
            estimate,
        })
    }

    /// Spread against the simulated zenith angle, two particles. The azimuth
    /// spread at zenith 0 is meaningless.
    pub fn vs_zenith(&self) -> ShowerResult<UncertaintyCurve> {
        let mut measured = Vec::new();
        for theta in ZENITH_VARIANTS {
            let filter = EventFilter {
                sim_theta: Some(theta),
                ..self.reference_filter()
            };
            measured.push(self.spread(theta, &filter)?);
        }

        let estimate = linspace(0.0, 35f64.to_radians(), 50)
            .into_iter()
            .map(|t| {
                let (theta_sq, phi_sq) = mean_errors_sq(&self.model, t, &self.geometry);
                EstimatePoint {
                    x: t,
                    theta: theta_sq.sqrt(),
                    phi: phi_sq.sqrt(),
                }
            })
            .collect();

        Ok(UncertaintyCurve {
            parameter: "zenith",
            measured,
            estimate,
        })
    }

    /// Spread against the station size, zenith 22.5°, two particles.
    pub fn vs_size(&self) -> ShowerResult<UncertaintyCurve> {
        let mut measured = Vec::new();
        for size in [5u8, 10, 20] {
            let filter = EventFilter {
                size: Some(size),
                ..self.reference_filter()
            };
            measured.push(self.spread(f64::from(size), &filter)?);
        }

        let estimate = linspace(5.0, 20.0, 50)
            .into_iter()
            .map(|s| {
                let geometry = self.geometry.with_size(s);
                let (theta_sq, phi_sq) = mean_errors_sq(&self.model, REFERENCE_ZENITH, &geometry);
                EstimatePoint {
                    x: s,
                    theta: theta_sq.sqrt(),
                    phi: phi_sq.sqrt(),
                }
            })
            .collect();

        Ok(UncertaintyCurve {
            parameter: "station_size",
            measured,
            estimate,
        })
    }

    /// Spread against the time bin width. Binned variants are the dithered
    /// ones; a uniform bin of width `b` adds `b²/12` to the timing variance.
    pub fn vs_bin_size(&self) -> ShowerResult<UncertaintyCurve> {
        let mut measured = Vec::new();
        for bin in [0.0, 1.0, 2.5, 5.0] {
            let filter = EventFilter {
                bin: Some(bin),
                bin_r: Some(bin > 0.0),
                ..self.reference_filter()
            };
            measured.push(self.spread(bin, &filter)?);
        }

        let (theta_sq, phi_sq) = mean_relative_errors_sq(REFERENCE_ZENITH, &self.geometry);
        let sigma_sq = self.model.timing_error.powi(2);
        let estimate = linspace(0.0, 5.0, 50)
            .into_iter()
            .map(|b| {
                let variance = sigma_sq + b * b / 12.0;
                EstimatePoint {
                    x: b,
                    theta: (variance * theta_sq).sqrt(),
                    phi: (variance * phi_sq).sqrt(),
                }
            })
            .collect();

        Ok(UncertaintyCurve {
            parameter: "bin_size",
            measured,
            estimate,
        })
    }

    /// Core distances of the reconstructed events per minimum particle count,
    /// zenith 22.5°.
    pub fn core_distances(&self) -> ShowerResult<Vec<CoreDistancePoint>> {
        let mut points = Vec::new();
        for d in 1..=5u16 {
            let filter = EventFilter {
                density: Some(DensityCut::Exactly(d)),
                ..self.reference_filter()
            };
            let r: Vec<f64> = self
                .store
                .read_events(self.name, &filter)?
                .iter()
                .map(|e| e.r)
                .collect();
            points.push(CoreDistancePoint {
                density: d,
                count: r.len(),
                mean: r.iter().mean(),
                std: r.iter().population_std_dev(),
            });
        }
        Ok(points)
    }
}

/// Fraction of events with at least `min_particles` on stations 1, 3 and 4,
/// in 19 core-distance bins over `[0, 100)` m, averaged over the showers of
/// `simulation`. Showers without events in a bin do not contribute to it.
pub fn reconstruction_efficiency<S: ShowerStore + ?Sized>(
    store: &S,
    simulation: &str,
    min_particles: u16,
) -> ShowerResult<Vec<EfficiencyPoint>> {
    let edges = linspace(0.0, 100.0, 20);
    let mut per_bin: Vec<Vec<f64>> = vec![Vec::new(); edges.len() - 1];

    for shower in store.list_showers(simulation)? {
        let observables: HashMap<u32, u16> = store
            .observables(shower.id, None)?
            .iter()
            .map(|o| (o.id, o.min_density()))
            .collect();
        let coincidences = store.coincidences(shower.id, None)?;

        for (i, bin) in edges.windows(2).enumerate() {
            let densities: Vec<u16> = coincidences
                .iter()
                .filter(|c| bin[0] <= c.r && c.r < bin[1])
                .filter_map(|c| observables.get(&c.id).copied())
                .collect();
            if densities.is_empty() {
                continue;
            }
            let passed = densities.iter().filter(|&&d| d >= min_particles).count();
            per_bin[i].push(passed as f64 / densities.len() as f64);
        }
    }

    Ok(edges
        .windows(2)
        .zip(per_bin)
        .map(|(bin, fractions)| EfficiencyPoint {
            r_lo: bin[0],
            r_hi: bin[1],
            efficiency: fractions.mean(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::test_helpers::{coincidence, observable, MemStore};
    use approx::assert_abs_diff_eq;

    fn event(density: u16, sim_theta: f64, r_theta: f64, sim_phi: f64, r_phi: f64) -> ReconstructedEvent {
        ReconstructedEvent {
            r: 20.0,
            phi: 0.0,
            alpha: 0.0,
            t: [0.0; 4],
            n: [density; 4],
            sim_theta,
            sim_phi,
            r_theta,
            r_phi,
            density,
            size: 10,
            bin: 0.0,
            bin_r: false,
        }
    }

    #[test]
    fn test_angle_spread() {
        let events = vec![
            event(2, 0.4, 0.3, 1.0, 0.9),
            event(2, 0.4, 0.5, 1.0, 1.1),
        ];
        let (theta, phi) = angle_spread(&events);
        assert_abs_diff_eq!(theta, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(phi, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_spread_wraps_azimuth() {
        // Both azimuth errors are 0.1 rad once wrapped.
        let events = vec![
            event(2, 0.4, 0.4, PI - 0.05, -PI + 0.05),
            event(2, 0.4, 0.4, -PI + 0.05, PI - 0.05),
        ];
        let (_, phi) = angle_spread(&events);
        assert_abs_diff_eq!(phi, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_angle_spread_empty_is_nan() {
        let (theta, phi) = angle_spread(&[]);
        assert!(theta.is_nan());
        assert!(phi.is_nan());
    }

    #[test]
    fn test_vs_density_selects_exact_density() {
        let store = MemStore::default();
        store.create_reconstruction("full", "test").unwrap();
        store
            .append_events(
                "full",
                &[
                    event(1, PI / 8.0, PI / 8.0 + 0.1, 0.5, 0.5),
                    event(1, PI / 8.0, PI / 8.0 - 0.1, 0.5, 0.5),
                    event(2, PI / 8.0, PI / 8.0, 0.5, 0.6),
                    event(3, 0.1, 0.1, 0.5, 0.5),
                ],
            )
            .unwrap();

        let analysis = UncertaintyAnalysis::new(
            &store,
            "full",
            ReconstructionGeometry::default(),
            ErrorModel::default(),
        );
        let curve = analysis.vs_density().unwrap();
        assert_eq!(curve.measured.len(), 5);
        assert_eq!(curve.measured[0].count, 2);
        assert_abs_diff_eq!(curve.measured[0].theta_std, 0.1, epsilon = 1e-12);
        assert_eq!(curve.measured[1].count, 1);
        assert_eq!(curve.measured[2].count, 0);
        assert_eq!(curve.estimate.len(), 50);
        // More particles, sharper first-arrival time.
        assert!(curve.estimate[49].theta < curve.estimate[0].theta);
    }

    #[test]
    fn test_estimates_are_finite_and_ordered() {
        let store = MemStore::default();
        store.create_reconstruction("full", "test").unwrap();
        let analysis = UncertaintyAnalysis::new(
            &store,
            "full",
            ReconstructionGeometry::default(),
            ErrorModel::default(),
        );

        let size = analysis.vs_size().unwrap();
        assert!(size.estimate.iter().all(|p| p.theta.is_finite() && p.phi.is_finite()));
        assert!(size.estimate[49].theta < size.estimate[0].theta);

        let bins = analysis.vs_bin_size().unwrap();
        assert!(bins.estimate[49].theta > bins.estimate[0].theta);
        let expected = ErrorModel::default().timing_error
            * mean_over_azimuth(|p| {
                relative_theta_error_sq(PI / 8.0, p, &ReconstructionGeometry::default())
            })
            .sqrt();
        assert_abs_diff_eq!(bins.estimate[0].theta, expected, epsilon = 1e-12);

        let zenith = analysis.vs_zenith().unwrap();
        assert_eq!(zenith.measured.len(), 4);
        assert!(zenith.estimate[1..].iter().all(|p| p.phi.is_finite()));

        // One particle: the first-arrival spread of a single hit.
        let density = analysis.vs_density().unwrap();
        assert_abs_diff_eq!(
            density.estimate[0].theta,
            crate::timing::std_t(1.0) * expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_estimates_scale_with_timing_error() {
        let store = MemStore::default();
        store.create_reconstruction("full", "test").unwrap();
        let geometry = ReconstructionGeometry::default();
        let coarse = UncertaintyAnalysis::new(&store, "full", geometry, ErrorModel::new(4.0));
        let fine = UncertaintyAnalysis::new(&store, "full", geometry, ErrorModel::new(2.0));

        let (a, b) = (coarse.vs_size().unwrap(), fine.vs_size().unwrap());
        for (c, f) in a.estimate.iter().zip(&b.estimate) {
            assert_abs_diff_eq!(c.theta, 2.0 * f.theta, epsilon = 1e-12);
            assert_abs_diff_eq!(c.phi, 2.0 * f.phi, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_core_distances() {
        let store = MemStore::default();
        store.create_reconstruction("full", "test").unwrap();
        let mut near = event(2, PI / 8.0, PI / 8.0, 0.0, 0.0);
        near.r = 10.0;
        let mut far = near.clone();
        far.r = 30.0;
        store.append_events("full", &[near, far]).unwrap();

        let analysis = UncertaintyAnalysis::new(
            &store,
            "full",
            ReconstructionGeometry::default(),
            ErrorModel::default(),
        );
        let points = analysis.core_distances().unwrap();
        assert_eq!(points[1].density, 2);
        assert_eq!(points[1].count, 2);
        assert_abs_diff_eq!(points[1].mean, 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(points[1].std, 10.0, epsilon = 1e-12);
        assert_eq!(points[0].count, 0);
    }

    #[test]
    fn test_reconstruction_efficiency() {
        let store = MemStore::default();
        let a = store.add_shower("zenith_0", "shower_0").unwrap();
        let b = store.add_shower("zenith_0", "shower_1").unwrap();
        // Shower a: two events near the core, one passes.
        store
            .insert_observables(
                a,
                &[
                    observable(0, [0.0; 4], [2, 0, 2, 2]),
                    observable(1, [0.0; 4], [2, 2, 0, 2]),
                ],
            )
            .unwrap();
        store
            .insert_coincidences(a, &[coincidence(0, 1.0, 0.0), coincidence(1, 2.0, 0.0)])
            .unwrap();
        // Shower b: one event near the core that passes, one far out.
        store
            .insert_observables(
                b,
                &[
                    observable(0, [0.0; 4], [5, 5, 5, 5]),
                    observable(1, [0.0; 4], [0, 0, 0, 0]),
                ],
            )
            .unwrap();
        store
            .insert_coincidences(b, &[coincidence(0, 3.0, 0.0), coincidence(1, 90.0, 0.0)])
            .unwrap();

        let points = reconstruction_efficiency(&store, "zenith_0", 1).unwrap();
        assert_eq!(points.len(), 19);
        assert_abs_diff_eq!(points[0].efficiency, 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(points[17].efficiency, 0.0, epsilon = 1e-12);
        assert!(points[5].efficiency.is_nan());
    }
}
