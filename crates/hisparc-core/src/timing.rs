//! Spread of the first-arrival time when several particles hit a detector.
//!
//! With `n` particles whose arrival times are independent unit normals, the
//! detector records the earliest one. Its density is
//! `n · Q(t, n)` with `Q(t, n) = (½·erfc(t/√2))^(n-1) · φ(t)`.

use std::f64::consts::{PI, SQRT_2};

use statrs::function::erf::erf;

fn q(t: f64, n: f64) -> f64 {
    (0.5 * (1.0 - erf(t / SQRT_2))).powf(n - 1.0) * (-0.5 * t * t).exp() / (2.0 * PI).sqrt()
}

/// Composite Simpson rule over `[a, b]` with `steps` intervals (rounded up to
/// even).
pub(crate) fn simpson(f: impl Fn(f64) -> f64, a: f64, b: f64, steps: usize) -> f64 {
    let steps = (steps.max(2) + 1) & !1;
    let h = (b - a) / steps as f64;
    let mut sum = f(a) + f(b);
    for i in 1..steps {
        let x = a + h * i as f64;
        sum += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    sum * h / 3.0
}

const LIMIT: f64 = 12.0;
const STEPS: usize = 4000;

/// Mean of the earliest of `n` unit-normal arrival times.
pub fn expected_first_arrival(n: f64) -> f64 {
    n * simpson(|t| t * q(t, n), -LIMIT, LIMIT, STEPS)
}

/// Standard deviation of the earliest of `n` unit-normal arrival times.
/// `n` need not be an integer.
pub fn std_t(n: f64) -> f64 {
    let mean = expected_first_arrival(n);
    let second = n * simpson(|t| t * t * q(t, n), -LIMIT, LIMIT, STEPS);
    (second - mean * mean).sqrt()
}
