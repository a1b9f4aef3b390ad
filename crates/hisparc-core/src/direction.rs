//! Shower direction from arrival-time differences.
//!
//! The azimuth follows from the ratio of the two time differences and the
//! station bearings. Each time difference then gives its own zenith estimate,
//! and the two are combined with weights `1/σᵢ` taken from the analytic
//! error model evaluated at each candidate.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error_model::{relative_zenith_error_sq, ZenithCandidate};
use crate::event::Observable;
use crate::geometry::ReconstructionGeometry;

/// Speed of light in m/s.
pub const SPEED_OF_LIGHT: f64 = 3.00e8;

/// Reconstructed shower direction in radians. Either angle is NaN when the
/// timing is inconsistent with a flat shower front.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub theta: f64,
    pub phi: f64,
}

impl Direction {
    pub fn is_valid(&self) -> bool {
        !self.theta.is_nan() && !self.phi.is_nan()
    }
}

/// Time differences between the reference station and the two comparison
/// stations, `(t1 - t3, t1 - t4)`.
pub fn time_differences(event: &Observable) -> (f64, f64) {
    (event.t[0] - event.t[2], event.t[0] - event.t[3])
}

/// Reconstruct the direction of a single event.
pub fn reconstruct_event(event: &Observable, geometry: &ReconstructionGeometry) -> Direction {
    let (dt1, dt2) = time_differences(event);
    reconstruct_angle_dt(dt1, dt2, geometry)
}

/// Reconstruct a direction from two time differences in ns.
pub fn reconstruct_angle_dt(dt1: f64, dt2: f64, g: &ReconstructionGeometry) -> Direction {
    let (r1, r2) = (g.r1, g.r2);

    let phi = (dt2 * r1 * g.phi1.cos() - dt1 * r2 * g.phi2.cos())
        .atan2((dt2 * r1 * g.phi1.sin() - dt1 * r2 * g.phi2.sin()) * -1.0);
    // atan2 yields -π for a negative-zero ordinate; keep the range half-open.
    let phi = if phi == -PI { PI } else { phi };

    let theta1 = (SPEED_OF_LIGHT * dt1 * 1e-9 / (r1 * (phi - g.phi1).cos())).asin();
    let theta2 = (SPEED_OF_LIGHT * dt2 * 1e-9 / (r2 * (phi - g.phi2).cos())).asin();

    let e1 = relative_zenith_error_sq(theta1, phi, g, ZenithCandidate::First).sqrt();
    let e2 = relative_zenith_error_sq(theta2, phi, g, ZenithCandidate::Second).sqrt();

    Direction {
        theta: weighted_zenith(theta1, e1, theta2, e2),
        phi,
    }
}

/// Combine two zenith candidates with weights `1/e`.
///
/// A NaN candidate is left out. A candidate with infinite error gets zero
/// weight, so the other one is returned unchanged. When neither candidate
/// has a usable weight, their plain mean is returned.
pub fn weighted_zenith(theta1: f64, e1: f64, theta2: f64, e2: f64) -> f64 {
    match (theta1.is_nan(), theta2.is_nan()) {
        (true, true) => f64::NAN,
        (false, true) => theta1,
        (true, false) => theta2,
        (false, false) => {
            let w1 = weight(e1);
            let w2 = weight(e2);
            match (w1 > 0.0, w2 > 0.0) {
                (true, true) => (w1 * theta1 + w2 * theta2) / (w1 + w2),
                (true, false) => theta1,
                (false, true) => theta2,
                (false, false) => (theta1 + theta2) / 2.0,
            }
        }
    }
}

fn weight(e: f64) -> f64 {
    let w = 1.0 / e;
    if w.is_finite() {
        w
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_model::linspace;
    use approx::assert_abs_diff_eq;

    fn geometry() -> ReconstructionGeometry {
        ReconstructionGeometry::default()
    }

    /// Arrival-time differences for a flat front from `(theta, phi)`, using
    /// the same sign convention as the reconstruction.
    fn forward(theta: f64, phi: f64, g: &ReconstructionGeometry) -> (f64, f64) {
        let dt = |r: f64, bearing: f64| r * theta.sin() * (phi - bearing).cos() / 0.3;
        (dt(g.r1, g.phi1), dt(g.r2, g.phi2))
    }

    #[test]
    fn test_no_delay_is_vertical() {
        let direction = reconstruct_angle_dt(0.0, 0.0, &geometry());
        assert_eq!(direction.theta, 0.0);
    }

    #[test]
    fn test_round_trip_direction() {
        let g = geometry();
        for &(theta, phi) in &[(0.3, 0.5), (0.6, -2.0), (0.1, 3.0), (0.39, -0.7)] {
            let (dt1, dt2) = forward(theta, phi, &g);
            let direction = reconstruct_angle_dt(dt1, dt2, &g);
            assert_abs_diff_eq!(direction.theta, theta, epsilon = 1e-9);
            assert_abs_diff_eq!(direction.phi, phi, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_inconsistent_candidate_is_excluded() {
        // |c·dt1 / (R·cos(φ-φ1))| > 1 while dt2 = 0 keeps the second candidate.
        let direction = reconstruct_angle_dt(100.0, 0.0, &geometry());
        assert_eq!(direction.theta, 0.0);
        assert!(!direction.phi.is_nan());
    }

    #[test]
    fn test_both_candidates_inconsistent() {
        let direction = reconstruct_angle_dt(100.0, 100.0, &geometry());
        assert!(direction.theta.is_nan());
        assert!(!direction.is_valid());
    }

    #[test]
    fn test_angle_ranges() {
        let g = geometry();
        for dt1 in linspace(-40.0, 40.0, 33) {
            for dt2 in linspace(-40.0, 40.0, 33) {
                let d = reconstruct_angle_dt(dt1, dt2, &g);
                assert!(d.phi > -PI && d.phi <= PI, "phi {} out of range", d.phi);
                assert!(
                    d.theta.is_nan() || (-PI / 2.0..=PI / 2.0).contains(&d.theta),
                    "theta {} out of range",
                    d.theta
                );
            }
        }
    }

    #[test]
    fn test_larger_station_means_smaller_zenith() {
        let small = reconstruct_angle_dt(5.0, -3.0, &geometry().with_size(10.0));
        let large = reconstruct_angle_dt(5.0, -3.0, &geometry().with_size(20.0));
        assert!(large.theta < small.theta);
        assert_abs_diff_eq!(large.phi, small.phi, epsilon = 1e-12);
    }

    #[test]
    fn test_weighted_zenith_infinite_error() {
        assert_eq!(weighted_zenith(0.3, f64::INFINITY, 0.41, 0.02), 0.41);
        assert_eq!(weighted_zenith(0.3, 0.02, 0.41, f64::INFINITY), 0.3);
        assert_eq!(weighted_zenith(f64::NAN, 0.02, 0.41, 0.5), 0.41);
        assert!(weighted_zenith(f64::NAN, 0.02, f64::NAN, 0.5).is_nan());
    }

    #[test]
    fn test_weighted_zenith_inverse_sigma() {
        // Weights 1/0.1 and 1/0.3.
        let theta = weighted_zenith(0.2, 0.1, 0.6, 0.3);
        assert_abs_diff_eq!(theta, (10.0 * 0.2 + 0.6 / 0.3) / (10.0 + 1.0 / 0.3), epsilon = 1e-12);
        assert_abs_diff_eq!(
            weighted_zenith(0.2, f64::INFINITY, 0.4, f64::INFINITY),
            0.3,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_reconstruct_event_uses_reference_station() {
        let event = Observable {
            id: 1,
            t: [10.0, -999.0, 5.0, 13.0],
            n: [1, 0, 1, 1],
            r: 20.0,
            phi: 0.0,
            alpha: 0.0,
        };
        assert_eq!(time_differences(&event), (5.0, -3.0));
        let g = geometry();
        assert_eq!(reconstruct_event(&event, &g), reconstruct_angle_dt(5.0, -3.0, &g));
    }
}
