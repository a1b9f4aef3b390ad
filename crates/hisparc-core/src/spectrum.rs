//! Pulse-height spectrum decomposition into a power-law background and a
//! smeared Landau peak.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ShowerError, ShowerResult};
use crate::error_model::linspace;
use crate::landau::{Scintillator, MPV};
use crate::simplex::{minimize, SimplexOptions};

/// Background-only window, ADC.
pub const POWER_LAW_WINDOW: (f64, f64) = (500.0, 2000.0);
/// Peak window, ADC.
pub const LANDAU_WINDOW: (f64, f64) = (4500.0, 5500.0);
/// Window of the joint fit, ADC.
pub const JOINT_WINDOW: (f64, f64) = (500.0, 6000.0);

/// Start of the peak fit: the MIP peak near 5000 ADC.
pub const LANDAU_START: ConvolvedLandau = ConvolvedLandau {
    count_scale: 1e4 / 0.32,
    mev_scale: MPV / 5000.0,
    gauss_scale: 1.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumOptions {
    pub range_max: f64,
    pub n_bins: usize,
    /// Evaluation limit of the joint fit.
    pub max_evaluations: usize,
}

impl Default for SpectrumOptions {
    fn default() -> Self {
        Self {
            range_max: 40000.0,
            n_bins: 400,
            max_evaluations: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<f64>,
}

impl Histogram {
    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|e| (e[0] + e[1]) / 2.0).collect()
    }
}

/// `n_bins` equal bins over `[0, range_max]`; the last bin includes its upper
/// edge and values outside the range are dropped.
pub fn histogram(values: &[f64], range_max: f64, n_bins: usize) -> Histogram {
    let edges = linspace(0.0, range_max, n_bins + 1);
    let mut counts = vec![0.0; n_bins];
    if n_bins > 0 && range_max > 0.0 {
        let width = range_max / n_bins as f64;
        for &v in values {
            if !(0.0..=range_max).contains(&v) {
                continue;
            }
            let i = ((v / width) as usize).min(n_bins - 1);
            counts[i] += 1.0;
        }
    }
    Histogram { edges, counts }
}

/// Piecewise-linear interpolation of `(xp, fp)` at `x`, clamped to the end
/// values outside `xp`. `xp` must be increasing.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    match (xp.first(), xp.last()) {
        (Some(&lo), Some(&hi)) => {
            if x <= lo {
                return fp[0];
            }
            if x >= hi {
                return fp[fp.len() - 1];
            }
            let j = xp.partition_point(|&v| v <= x);
            let (x0, x1) = (xp[j - 1], xp[j]);
            let (y0, y1) = (fp[j - 1], fp[j]);
            y0 + (y1 - y0) * (x - x0) / (x1 - x0)
        }
        _ => f64::NAN,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerLaw {
    pub n: f64,
    pub a: f64,
}

impl PowerLaw {
    pub fn eval(&self, x: f64) -> f64 {
        self.n * x.powf(-self.a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvolvedLandau {
    pub count_scale: f64,
    /// ADC to MeV.
    pub mev_scale: f64,
    /// Detector resolution, MeV.
    pub gauss_scale: f64,
}

impl ConvolvedLandau {
    fn params(&self) -> [f64; 3] {
        [self.count_scale, self.mev_scale, self.gauss_scale]
    }

    fn from_params(p: &[f64]) -> Self {
        Self {
            count_scale: p[0],
            mev_scale: p[1],
            gauss_scale: p[2],
        }
    }

    /// Pulse height of the MIP peak, ADC.
    pub fn mip_peak(&self) -> f64 {
        MPV / self.mev_scale
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumFit {
    pub power_law: PowerLaw,
    pub landau: ConvolvedLandau,
    /// Summed squared residual of the joint fit.
    pub residual: f64,
    pub evaluations: usize,
    pub converged: bool,
}

/// Three-stage fit: background alone, peak on the background-subtracted
/// spectrum, then both together.
pub struct SpectrumFitter {
    scintillator: Scintillator,
    options: SpectrumOptions,
}

impl SpectrumFitter {
    pub fn new(options: SpectrumOptions) -> Self {
        Self {
            scintillator: Scintillator::new(),
            options,
        }
    }

    pub fn fit_integrals(&self, integrals: &[f64]) -> ShowerResult<SpectrumFit> {
        let hist = histogram(integrals, self.options.range_max, self.options.n_bins);
        self.fit(&hist)
    }

    pub fn fit(&self, hist: &Histogram) -> ShowerResult<SpectrumFit> {
        let x = hist.centers();
        let y = &hist.counts;

        let power_law = self.fit_power_law(&x, y)?;
        info!(n = power_law.n, a = power_law.a, "power-law background");

        let residual: Vec<f64> = x
            .iter()
            .zip(y)
            .map(|(&xi, &yi)| yi - power_law.eval(xi))
            .collect();
        let landau = self.fit_landau(&x, &residual)?;
        info!(
            count_scale = landau.count_scale,
            mev_scale = landau.mev_scale,
            gauss_scale = landau.gauss_scale,
            "landau peak"
        );

        let fit = self.fit_complete(&x, y, power_law, landau)?;
        info!(
            residual = fit.residual,
            evaluations = fit.evaluations,
            converged = fit.converged,
            mip_peak = fit.landau.mip_peak(),
            "joint fit"
        );
        Ok(fit)
    }

    /// Grid symmetric about zero, so the convolution has support on both
    /// sides of the peak.
    fn symmetric_grid(&self) -> Vec<f64> {
        let r = self.options.range_max;
        linspace(-r, r, 2 * self.options.n_bins + 1)
    }

    /// Least squares of `N x^-a` on the background window, started from the
    /// log-linear regression.
    pub fn fit_power_law(&self, x: &[f64], y: &[f64]) -> ShowerResult<PowerLaw> {
        let (lo, hi) = POWER_LAW_WINDOW;
        let points: Vec<(f64, f64)> = x
            .iter()
            .zip(y)
            .filter(|&(&xi, _)| lo <= xi && xi < hi)
            .map(|(&xi, &yi)| (xi, yi))
            .collect();
        let logs: Vec<(f64, f64)> = points
            .iter()
            .filter(|(_, yi)| *yi > 0.0)
            .map(|(xi, yi)| (xi.ln(), yi.ln()))
            .collect();
        if logs.len() < 2 {
            return Err(ShowerError::InvalidInput(format!(
                "fewer than two populated bins in [{lo}, {hi})"
            )));
        }

        let m = logs.len() as f64;
        let mx = logs.iter().map(|p| p.0).sum::<f64>() / m;
        let my = logs.iter().map(|p| p.1).sum::<f64>() / m;
        let sxx: f64 = logs.iter().map(|p| (p.0 - mx).powi(2)).sum();
        let sxy: f64 = logs.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let start = [my - slope * mx, -slope];
        debug!(ln_n = start[0], a = start[1], "log-linear start");

        let cost = |p: &[f64]| {
            let law = PowerLaw {
                n: p[0].exp(),
                a: p[1],
            };
            points
                .iter()
                .map(|&(xi, yi)| (yi - law.eval(xi)).powi(2))
                .sum::<f64>()
        };
        let m = minimize(cost, &start, &SimplexOptions::default())?;
        Ok(PowerLaw {
            n: m.x[0].exp(),
            a: m.x[1],
        })
    }

    /// Fit the convolved Landau to a background-subtracted spectrum on the
    /// peak window.
    pub fn fit_landau(&self, x: &[f64], y: &[f64]) -> ShowerResult<ConvolvedLandau> {
        let grid = self.symmetric_grid();
        let y_symm: Vec<f64> = grid.iter().map(|&g| interp(g, x, y)).collect();
        let (lo, hi) = LANDAU_WINDOW;
        let m = minimize(
            |p| {
                self.scintillator
                    .residuals([p[0], p[1], p[2]], &grid, &y_symm, lo, hi)
            },
            &LANDAU_START.params(),
            &SimplexOptions::default(),
        )?;
        debug!(evaluations = m.evaluations, converged = m.converged, "peak fit");
        Ok(ConvolvedLandau::from_params(&m.x))
    }

    /// Refine all five parameters against the raw spectrum on the joint
    /// window.
    pub fn fit_complete(
        &self,
        x: &[f64],
        y: &[f64],
        power_law: PowerLaw,
        landau: ConvolvedLandau,
    ) -> ShowerResult<SpectrumFit> {
        let grid = self.symmetric_grid();
        let y_symm: Vec<f64> = grid.iter().map(|&g| interp(g, x, y)).collect();
        let (lo, hi) = JOINT_WINDOW;

        let cost = |p: &[f64]| {
            let law = PowerLaw { n: p[0], a: p[1] };
            self.scintillator
                .conv_landau_window(&grid, [p[2], p[3], p[4]], lo, hi)
                .into_iter()
                .map(|(i, peak)| (y_symm[i] - (law.eval(grid[i]) + peak)).powi(2))
                .sum::<f64>()
        };

        let start = [
            power_law.n,
            power_law.a,
            landau.count_scale,
            landau.mev_scale,
            landau.gauss_scale,
        ];
        let options = SimplexOptions {
            max_evaluations: Some(self.options.max_evaluations),
            ..SimplexOptions::default()
        };
        let m = minimize(cost, &start, &options)?;

        Ok(SpectrumFit {
            power_law: PowerLaw { n: m.x[0], a: m.x[1] },
            landau: ConvolvedLandau::from_params(&m.x[2..]),
            residual: m.value,
            evaluations: m.evaluations,
            converged: m.converged,
        })
    }
}
