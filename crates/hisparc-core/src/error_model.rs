//! Analytic uncertainty of the direction reconstruction.
//!
//! First-order propagation of the arrival-time errors through the azimuth and
//! zenith formulas. The `relative_*` functions assume a unit timing error on
//! each of the three stations involved (uncorrelated); [`ErrorModel`] scales
//! them by a per-detector timing error.
//!
//! All functions are total over finite inputs: wherever the closed form
//! evaluates to NaN the squared error is reported as `+∞`, so a candidate
//! with an undefined error receives zero weight.

use crate::geometry::ReconstructionGeometry;

/// Speed of light in m/ns.
const C: f64 = 0.3;

/// Default timing error of a single detector, in ns.
pub const DEFAULT_TIMING_ERROR: f64 = 4.0;

/// Which of the two zenith estimates: from `t1 - t3` or from `t1 - t4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZenithCandidate {
    First,
    Second,
}

fn nan_to_inf(x: f64) -> f64 {
    if x.is_nan() {
        f64::INFINITY
    } else {
        x
    }
}

fn azimuth_error_sq_raw(theta: f64, phi: f64, g: &ReconstructionGeometry) -> f64 {
    let (r1, r2) = (g.r1, g.r2);
    let tanphi = phi.tan();
    let (sinphi1, cosphi1) = g.phi1.sin_cos();
    let (sinphi2, cosphi2) = g.phi2.sin_cos();

    let den = (1.0 + tanphi.powi(2)).powi(2)
        * r1.powi(2)
        * r2.powi(2)
        * theta.sin().powi(2)
        * (sinphi1 * (phi - g.phi2).cos() - sinphi2 * (phi - g.phi1).cos()).powi(2)
        / C.powi(2);

    let a = r1.powi(2) * sinphi1.powi(2) + r2.powi(2) * sinphi2.powi(2)
        - r1 * r2 * sinphi1 * sinphi2;
    let b = 2.0 * r1.powi(2) * sinphi1 * cosphi1 + 2.0 * r2.powi(2) * sinphi2 * cosphi2
        - r1 * r2 * sinphi2 * cosphi1
        - r1 * r2 * sinphi1 * cosphi2;
    let c = r1.powi(2) * cosphi1.powi(2) + r2.powi(2) * cosphi2.powi(2)
        - r1 * r2 * cosphi1 * cosphi2;

    2.0 * (a * tanphi.powi(2) + b * tanphi + c) / den
}

/// Common denominator of the azimuth partial derivatives.
fn dphi_den(theta: f64, phi: f64, g: &ReconstructionGeometry) -> f64 {
    (1.0 + phi.tan().powi(2))
        * g.r1
        * g.r2
        * theta.sin()
        * (g.phi2.sin() * (phi - g.phi1).cos() - g.phi1.sin() * (phi - g.phi2).cos())
        / C
}

/// ∂φ/∂t of the reference station.
pub fn dphi_dt0(theta: f64, phi: f64, g: &ReconstructionGeometry) -> f64 {
    let tanphi = phi.tan();
    let num = g.r2 * g.phi2.cos() - g.r1 * g.phi1.cos()
        + tanphi * (g.r2 * g.phi2.sin() - g.r1 * g.phi1.sin());
    num / dphi_den(theta, phi, g)
}

/// ∂φ/∂t of the first comparison station.
pub fn dphi_dt1(theta: f64, phi: f64, g: &ReconstructionGeometry) -> f64 {
    let num = -g.r2 * (g.phi2.sin() * phi.tan() + g.phi2.cos());
    num / dphi_den(theta, phi, g)
}

/// ∂φ/∂t of the second comparison station.
pub fn dphi_dt2(theta: f64, phi: f64, g: &ReconstructionGeometry) -> f64 {
    let num = g.r1 * (g.phi1.sin() * phi.tan() + g.phi1.cos());
    num / dphi_den(theta, phi, g)
}

/// Squared azimuth error per unit timing variance, for a shower from
/// `(theta, phi)`.
pub fn relative_azimuth_error_sq(theta: f64, phi: f64, g: &ReconstructionGeometry) -> f64 {
    nan_to_inf(azimuth_error_sq_raw(theta, phi, g))
}

/// Squared error of one zenith candidate per unit timing variance. Includes
/// the contribution of the azimuth error, since each candidate is evaluated
/// at the reconstructed azimuth.
pub fn relative_zenith_error_sq(
    theta: f64,
    phi: f64,
    g: &ReconstructionGeometry,
    which: ZenithCandidate,
) -> f64 {
    let (phi_i, r_i, dphi_dti) = match which {
        ZenithCandidate::First => (g.phi1, g.r1, dphi_dt1(theta, phi, g)),
        ZenithCandidate::Second => (g.phi2, g.r2, dphi_dt2(theta, phi, g)),
    };

    let sintheta = theta.sin();
    let sinphiphi = (phi - phi_i).sin();

    let den = (1.0 - sintheta.powi(2)) * r_i.powi(2) * (phi - phi_i).cos().powi(2);

    let a = r_i.powi(2) * sinphiphi.powi(2) * azimuth_error_sq_raw(theta, phi, g);
    let b = r_i * C * sinphiphi * (dphi_dt0(theta, phi, g) - dphi_dti);
    let c = 2.0 * C.powi(2);

    nan_to_inf((a * sintheta.powi(2) - 2.0 * b * sintheta + c) / den)
}

/// Zenith error used for reporting: the first candidate's error.
pub fn relative_theta_error_sq(theta: f64, phi: f64, g: &ReconstructionGeometry) -> f64 {
    relative_zenith_error_sq(theta, phi, g, ZenithCandidate::First)
}

/// The error formulas scaled by a fixed per-detector timing error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorModel {
    /// Timing error of a single detector, in ns.
    pub timing_error: f64,
}

impl Default for ErrorModel {
    fn default() -> Self {
        Self {
            timing_error: DEFAULT_TIMING_ERROR,
        }
    }
}

impl ErrorModel {
    pub fn new(timing_error: f64) -> Self {
        Self { timing_error }
    }

    pub fn azimuth_error_sq(&self, theta: f64, phi: f64, g: &ReconstructionGeometry) -> f64 {
        self.timing_error.powi(2) * relative_azimuth_error_sq(theta, phi, g)
    }

    pub fn zenith_error_sq(
        &self,
        theta: f64,
        phi: f64,
        g: &ReconstructionGeometry,
        which: ZenithCandidate,
    ) -> f64 {
        self.timing_error.powi(2) * relative_zenith_error_sq(theta, phi, g, which)
    }

    /// Reported zenith error: the first candidate's.
    pub fn theta_error_sq(&self, theta: f64, phi: f64, g: &ReconstructionGeometry) -> f64 {
        self.zenith_error_sq(theta, phi, g, ZenithCandidate::First)
    }
}

/// `n` points evenly spaced over `[lo, hi]`, both ends included.
pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (n - 1) as f64;
            (0..n).map(|i| lo + step * i as f64).collect()
        }
    }
}

/// Average of `f` over 50 azimuths spanning `[-π, π]`.
pub fn mean_over_azimuth(f: impl Fn(f64) -> f64) -> f64 {
    use std::f64::consts::PI;
    let phis = linspace(-PI, PI, 50);
    phis.iter().map(|&p| f(p)).sum::<f64>() / phis.len() as f64
}
