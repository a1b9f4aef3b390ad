//! Energy deposit of a minimum ionising particle in a scintillator: a Landau
//! distribution, optionally smeared by a Gaussian detector resolution.

use std::f64::consts::PI;

use crate::timing::simpson;

/// Most probable energy deposit, MeV.
pub const MPV: f64 = 3.38;
/// Landau width parameter of the scintillator, MeV.
pub const XI: f64 = 0.172018;
/// Mode of the standard Landau density.
pub const LAMBDA_MODE: f64 = -0.22278;

const TABLE_LO: f64 = -5.0;
const TABLE_HI: f64 = 60.0;
const TABLE_STEP: f64 = 0.05;
const T_MAX: f64 = 25.0;

/// Kernel support in units of the Gaussian width.
const KERNEL_SIGMAS: f64 = 5.0;

/// Standard Landau density
/// `p(λ) = 1/π ∫₀^∞ exp(-πt/2) cos(t ln t + λt) dt`.
fn standard_pdf(lambda: f64) -> f64 {
    let integrand = |t: f64| {
        if t <= 0.0 {
            1.0
        } else {
            (-PI * t / 2.0).exp() * (t * t.ln() + lambda * t).cos()
        }
    };
    // Enough points per oscillation of the cosine.
    let steps = (T_MAX * (lambda.abs() + 10.0) / (2.0 * PI) * 20.0).ceil() as usize;
    (simpson(integrand, 0.0, T_MAX, steps) / PI).max(0.0)
}

/// Tabulated Landau density and the convolution with the detector
/// resolution.
#[derive(Debug, Clone)]
pub struct Scintillator {
    table: Vec<f64>,
}

impl Default for Scintillator {
    fn default() -> Self {
        Self::new()
    }
}

impl Scintillator {
    pub fn new() -> Self {
        let n = ((TABLE_HI - TABLE_LO) / TABLE_STEP).round() as usize + 1;
        let table = (0..n)
            .map(|i| standard_pdf(TABLE_LO + TABLE_STEP * i as f64))
            .collect();
        Self { table }
    }

    /// Standard Landau density, interpolated from the table. Zero below the
    /// table, `λ⁻²` tail above it.
    pub fn standard(&self, lambda: f64) -> f64 {
        if lambda.is_nan() {
            return f64::NAN;
        }
        if lambda < TABLE_LO {
            return 0.0;
        }
        let last = self.table.len() - 1;
        if lambda >= TABLE_HI {
            return self.table[last] * (TABLE_HI / lambda).powi(2);
        }
        let pos = (lambda - TABLE_LO) / TABLE_STEP;
        let i = (pos.floor() as usize).min(last - 1);
        let frac = pos - i as f64;
        self.table[i] * (1.0 - frac) + self.table[i + 1] * frac
    }

    /// Density of the energy deposit `delta` (MeV), per MeV.
    pub fn pdf(&self, delta: f64) -> f64 {
        self.standard((delta - MPV) / XI + LAMBDA_MODE) / XI
    }

    /// `count_scale · pdf(x · mev_scale)` on the uniform grid `x` (ADC),
    /// convolved with a Gaussian of width `gauss_scale` MeV.
    pub fn conv_landau(
        &self,
        x: &[f64],
        count_scale: f64,
        mev_scale: f64,
        gauss_scale: f64,
    ) -> Vec<f64> {
        let y = self.scaled_pdf(x, count_scale, mev_scale);
        let kernel = Kernel::new(x, mev_scale, gauss_scale);
        (0..y.len()).map(|i| kernel.apply(&y, i)).collect()
    }

    /// Summed squared residuals of `conv_landau` against `y` over the grid
    /// points with `lo <= x < hi`.
    pub fn residuals(&self, params: [f64; 3], x: &[f64], y: &[f64], lo: f64, hi: f64) -> f64 {
        let [count_scale, mev_scale, gauss_scale] = params;
        let model = self.scaled_pdf(x, count_scale, mev_scale);
        let kernel = Kernel::new(x, mev_scale, gauss_scale);
        window(x, lo, hi)
            .map(|i| (y[i] - kernel.apply(&model, i)).powi(2))
            .sum()
    }

    /// The convolved model at the grid points with `lo <= x < hi`, as
    /// `(index, value)` pairs.
    pub fn conv_landau_window(
        &self,
        x: &[f64],
        params: [f64; 3],
        lo: f64,
        hi: f64,
    ) -> Vec<(usize, f64)> {
        let [count_scale, mev_scale, gauss_scale] = params;
        let model = self.scaled_pdf(x, count_scale, mev_scale);
        let kernel = Kernel::new(x, mev_scale, gauss_scale);
        window(x, lo, hi).map(|i| (i, kernel.apply(&model, i))).collect()
    }

    fn scaled_pdf(&self, x: &[f64], count_scale: f64, mev_scale: f64) -> Vec<f64> {
        x.iter()
            .map(|&xi| count_scale * self.pdf(xi * mev_scale))
            .collect()
    }
}

pub(crate) fn window(x: &[f64], lo: f64, hi: f64) -> impl Iterator<Item = usize> + '_ {
    x.iter()
        .enumerate()
        .filter(move |&(_, &xi)| lo <= xi && xi < hi)
        .map(|(i, _)| i)
}

/// Sampled Gaussian, weights already multiplied by the grid step.
struct Kernel {
    weights: Vec<f64>,
}

impl Kernel {
    fn new(x: &[f64], mev_scale: f64, gauss_scale: f64) -> Self {
        let sigma = gauss_scale.abs();
        let h = match x {
            [a, b, ..] => ((b - a) * mev_scale).abs(),
            _ => 0.0,
        };
        // A kernel narrower than the grid step leaves the model unchanged.
        if !(h > 0.0 && sigma > h / 10.0 && sigma.is_finite()) {
            return Self { weights: vec![1.0] };
        }
        let half = ((KERNEL_SIGMAS * sigma / h).ceil() as usize).min(x.len());
        let norm = h / (sigma * (2.0 * PI).sqrt());
        let weights = (0..=half)
            .map(|k| {
                let d = k as f64 * h;
                norm * (-0.5 * (d / sigma).powi(2)).exp()
            })
            .collect();
        Self { weights }
    }

    /// Convolution at `i`, treating `y` as zero outside the grid.
    fn apply(&self, y: &[f64], i: usize) -> f64 {
        let mut sum = self.weights[0] * y[i];
        for (k, w) in self.weights.iter().enumerate().skip(1) {
            if let Some(v) = i.checked_sub(k).and_then(|j| y.get(j)) {
                sum += w * v;
            }
            if let Some(v) = y.get(i + k) {
                sum += w * v;
            }
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn grid(lo: f64, hi: f64, n: usize) -> Vec<f64> {
        crate::error_model::linspace(lo, hi, n)
    }

    #[test]
    fn test_standard_pdf_peak() {
        let s = Scintillator::new();
        let (mode, peak) = grid(-1.0, 1.0, 2001)
            .into_iter()
            .map(|l| (l, s.standard(l)))
            .fold((0.0, 0.0), |best, p| if p.1 > best.1 { p } else { best });
        assert_abs_diff_eq!(mode, LAMBDA_MODE, epsilon = 0.03);
        assert_abs_diff_eq!(peak, 0.1806, epsilon = 0.002);
    }

    #[test]
    fn test_standard_pdf_normalised() {
        let s = Scintillator::new();
        let step = 0.01;
        let body: f64 = grid(-10.0, 60.0, 7001)
            .iter()
            .map(|&l| s.standard(l))
            .sum::<f64>()
            * step;
        // The tail beyond the table holds roughly 1/60.
        assert_abs_diff_eq!(body, 1.0 - 1.0 / 60.0, epsilon = 0.01);
        assert_eq!(s.standard(-20.0), 0.0);
        assert!(s.standard(100.0) < s.standard(60.0));
    }

    #[test]
    fn test_pdf_mode_at_mpv() {
        let s = Scintillator::new();
        let at_mpv = s.pdf(MPV);
        assert!(at_mpv > s.pdf(MPV - 0.05));
        assert!(at_mpv > s.pdf(MPV + 0.05));
        assert_abs_diff_eq!(at_mpv, 0.1806 / XI, epsilon = 0.02);
    }

    #[test]
    fn test_convolution_preserves_area() {
        let s = Scintillator::new();
        let x = grid(-40000.0, 40000.0, 801);
        let mev_scale = MPV / 5000.0;
        let raw = s.conv_landau(&x, 1.0, mev_scale, 0.0);
        let smeared = s.conv_landau(&x, 1.0, mev_scale, 0.5);
        let area = |y: &[f64]| y.iter().sum::<f64>();
        assert_abs_diff_eq!(area(&raw), area(&smeared), epsilon = 1e-3 * area(&raw));
        let peak = |y: &[f64]| y.iter().cloned().fold(0.0, f64::max);
        assert!(peak(&smeared) < peak(&raw));
    }

    #[test]
    fn test_negative_gauss_scale_is_its_magnitude() {
        let s = Scintillator::new();
        let x = grid(0.0, 10000.0, 101);
        let a = s.conv_landau(&x, 1.0, MPV / 5000.0, 0.4);
        let b = s.conv_landau(&x, 1.0, MPV / 5000.0, -0.4);
        assert_eq!(a, b);
    }

    #[test]
    fn test_window_matches_full_convolution() {
        let s = Scintillator::new();
        let x = grid(-40000.0, 40000.0, 801);
        let params = [1e4 / 0.32, MPV / 5000.0, 1.0];
        let full = s.conv_landau(&x, params[0], params[1], params[2]);
        let part = s.conv_landau_window(&x, params, 4500.0, 5500.0);
        assert_eq!(part.len(), 10);
        for (i, v) in part {
            assert_abs_diff_eq!(v, full[i], epsilon = 1e-9);
        }
        let y: Vec<f64> = full.clone();
        assert_abs_diff_eq!(s.residuals(params, &x, &y, 4500.0, 5500.0), 0.0, epsilon = 1e-9);
    }
}
