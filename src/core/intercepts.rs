//! Intercept distributions for units embedded in a `d`-dimensional input space.
//!
//! A unit with unit-length encoder `e` and intercept `c` is active wherever
//! `e·x > c`. For inputs uniform in the unit `d`-ball that region covers
//! `½·I(1−c², (d+1)/2, ½)` of the ball when `c ≥ 0`, where `I` is the
//! regularized incomplete beta function. Uniform intercepts therefore give
//! badly skewed coverage once `d` grows: most units end up either almost
//! never or almost always active.
//!
//! [`AreaIntercepts`] inverts that relation. A base sample `x` maps to
//! `sign(x)·sqrt(1 − I⁻¹(|x|, (d+1)/2, ½))`, which makes the covered fraction
//! `|x|/2` on the positive branch and `1 − |x|/2` on the negative one, so a
//! uniform base on [−1, 1] yields uniformly distributed coverage at every `d`.
//!
//! `x = 0` takes the positive branch and maps to `+1` (a unit that is never
//! active).

use crate::error::ConfigError;
use crate::prng::Prng;

/// One-dimensional base distribution on [−1, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaseDistribution {
    Uniform { low: f64, high: f64 },
    Triangular { low: f64, mode: f64, high: f64 },
}

impl BaseDistribution {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (low, high) = self.support();
        if !(low.is_finite() && high.is_finite()) {
            return Err(ConfigError::invalid("intercept_bounds", "bounds must be finite"));
        }
        if low < -1.0 || high > 1.0 {
            return Err(ConfigError::invalid(
                "intercept_bounds",
                format!("[{low}, {high}] is not within [-1, 1]"),
            ));
        }
        if low >= high {
            return Err(ConfigError::invalid(
                "intercept_bounds",
                format!("low ({low}) must be below high ({high})"),
            ));
        }
        if let Self::Triangular { mode, .. } = *self {
            if !(low..=high).contains(&mode) {
                return Err(ConfigError::invalid(
                    "intercept_mode",
                    format!("mode {mode} outside [{low}, {high}]"),
                ));
            }
        }
        Ok(())
    }

    pub fn support(&self) -> (f64, f64) {
        match *self {
            Self::Uniform { low, high } => (low, high),
            Self::Triangular { low, high, .. } => (low, high),
        }
    }

    pub fn sample(&self, rng: &mut Prng) -> f64 {
        match *self {
            Self::Uniform { low, high } => rng.gen_range_f64(low, high),
            Self::Triangular { low, mode, high } => rng.triangular(low, mode, high),
        }
    }
}

/// Area-corrected intercepts for a `dimensions`-dimensional population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaIntercepts {
    dimensions: usize,
    base: BaseDistribution,
}

impl AreaIntercepts {
    pub fn new(dimensions: usize, base: BaseDistribution) -> Result<Self, ConfigError> {
        if dimensions < 1 {
            return Err(ConfigError::invalid("dimensions", "must be at least 1"));
        }
        base.validate()?;
        Ok(Self { dimensions, base })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn base(&self) -> BaseDistribution {
        self.base
    }

    /// Map one base sample to an intercept.
    pub fn transform(&self, x: f64) -> f64 {
        let a = (self.dimensions as f64 + 1.0) / 2.0;
        let sign = if x >= 0.0 { 1.0 } else { -1.0 };
        let y = inv_beta_reg(a, 0.5, x.abs());
        sign * (1.0 - y).max(0.0).sqrt()
    }

    pub fn sample(&self, n: usize, rng: &mut Prng) -> Vec<f64> {
        (0..n)
            .map(|_| self.transform(self.base.sample(rng)))
            .collect()
    }
}

/// Fraction of the unit `d`-ball in which a unit with intercept `c` is
/// active.
pub fn covered_fraction(dimensions: usize, intercept: f64) -> f64 {
    let c = intercept.clamp(-1.0, 1.0);
    let a = (dimensions as f64 + 1.0) / 2.0;
    let cap = 0.5 * beta_reg(a, 0.5, 1.0 - c * c);
    if c >= 0.0 {
        cap
    } else {
        1.0 - cap
    }
}

// =========================================================================
// Special functions
// =========================================================================

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEF: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the gamma function for `x > 0` (Lanczos, g = 7).
pub fn ln_gamma(x: f64) -> f64 {
    use core::f64::consts::PI;
    if x < 0.5 {
        // Reflection.
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = LANCZOS_COEF[0];
    for (i, c) in LANCZOS_COEF.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

/// Continued fraction for the incomplete beta function (modified Lentz).
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 1e-15;
    const TINY: f64 = 1e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        // Even step.
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        // Odd step.
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta function `I_x(a, b)`.
pub fn beta_reg(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = a * x.ln() + b * (1.0 - x).ln() - ln_beta(a, b);
    let front = ln_front.exp();
    // The continued fraction converges fastest on this side of the mean.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Inverse of [`beta_reg`] in `x`: returns `x` with `I_x(a, b) = p`.
///
/// Newton iteration on the density, falling back to bisection whenever a
/// step leaves the current bracket.
pub fn inv_beta_reg(a: f64, b: f64, p: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const TOL: f64 = 1e-15;

    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }

    let lb = ln_beta(a, b);
    let (mut lo, mut hi) = (0.0f64, 1.0f64);
    let mut x = 0.5;

    for _ in 0..MAX_ITER {
        let f = beta_reg(a, b, x) - p;
        if f.abs() < TOL {
            return x;
        }
        if f < 0.0 {
            lo = x;
        } else {
            hi = x;
        }

        let density = ((a - 1.0) * x.ln() + (b - 1.0) * (1.0 - x).ln() - lb).exp();
        let mut next = x - f / density;
        if !next.is_finite() || next <= lo || next >= hi {
            next = 0.5 * (lo + hi);
        }
        if (next - x).abs() < TOL || hi - lo < TOL {
            return next;
        }
        x = next;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(low: f64, high: f64) -> BaseDistribution {
        BaseDistribution::Uniform { low, high }
    }

    #[test]
    fn ln_gamma_matches_factorials() {
        assert!((ln_gamma(1.0)).abs() < 1e-12);
        assert!((ln_gamma(5.0) - 24f64.ln()).abs() < 1e-12);
        // Γ(1/2) = sqrt(pi)
        assert!((ln_gamma(0.5) - core::f64::consts::PI.sqrt().ln()).abs() < 1e-12);
    }

    #[test]
    fn beta_reg_closed_forms() {
        // I_x(a, 1) = x^a
        for &x in &[0.1, 0.3, 0.75, 0.95] {
            assert!((beta_reg(2.5, 1.0, x) - x.powf(2.5)).abs() < 1e-12);
        }
        // I_x(1, 1/2) = 1 - sqrt(1 - x)
        for &x in &[0.05, 0.5, 0.9] {
            assert!((beta_reg(1.0, 0.5, x) - (1.0 - (1.0 - x).sqrt())).abs() < 1e-12);
        }
        // Symmetric case.
        assert!((beta_reg(3.0, 3.0, 0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn inv_beta_reg_inverts() {
        // I_x(1, 1/2) = p  <=>  x = 1 - (1 - p)^2
        for &p in &[0.01, 0.2, 0.5, 0.8, 0.999] {
            let x = inv_beta_reg(1.0, 0.5, p);
            assert!((x - (1.0 - (1.0 - p).powi(2))).abs() < 1e-10, "p={p} x={x}");
        }
        for &a in &[1.5, 3.5, 6.5] {
            for &p in &[0.001, 0.3, 0.7, 0.99] {
                let x = inv_beta_reg(a, 0.5, p);
                assert!((beta_reg(a, 0.5, x) - p).abs() < 1e-10);
            }
        }
        assert_eq!(inv_beta_reg(2.0, 0.5, 0.0), 0.0);
        assert_eq!(inv_beta_reg(2.0, 0.5, 1.0), 1.0);
    }

    #[test]
    fn transform_is_odd_with_monotonic_magnitude() {
        for d in [1usize, 3, 8, 20] {
            let dist = AreaIntercepts::new(d, uniform(-1.0, 1.0)).unwrap();
            let mut prev = f64::INFINITY;
            for i in 1..100 {
                let x = i as f64 / 100.0;
                let pos = dist.transform(x);
                let neg = dist.transform(-x);
                assert_eq!(neg, -pos);
                // Magnitude shrinks as |x| grows: larger |x| means more coverage.
                assert!(pos <= prev);
                assert!((0.0..=1.0).contains(&pos));
                prev = pos;
            }
        }
    }

    #[test]
    fn zero_takes_positive_branch() {
        let dist = AreaIntercepts::new(4, uniform(-1.0, 1.0)).unwrap();
        assert_eq!(dist.transform(0.0), 1.0);
        assert_eq!(dist.transform(-0.0), 1.0);
        assert_eq!(dist.transform(1.0), 0.0);
        assert_eq!(dist.transform(-1.0), -0.0);
    }

    #[test]
    fn covered_fraction_undoes_transform() {
        for d in [2usize, 5, 10] {
            let dist = AreaIntercepts::new(d, uniform(-1.0, 1.0)).unwrap();
            for &x in &[0.1, 0.5, 0.9] {
                assert!((covered_fraction(d, dist.transform(x)) - x / 2.0).abs() < 1e-9);
                assert!((covered_fraction(d, dist.transform(-x)) - (1.0 - x / 2.0)).abs() < 1e-9);
            }
        }
        assert_eq!(covered_fraction(3, 1.0), 0.0);
        assert_eq!(covered_fraction(3, -1.0), 1.0);
    }

    #[test]
    fn one_dimension_reduces_to_linear_coverage() {
        // d = 1: covered fraction of [-1, 1] above c is (1 - c) / 2, so the
        // positive branch must return c = 1 - x.
        let dist = AreaIntercepts::new(1, uniform(-1.0, 1.0)).unwrap();
        for &x in &[0.1, 0.4, 0.9] {
            assert!((dist.transform(x) - (1.0 - x)).abs() < 1e-9);
        }
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(AreaIntercepts::new(0, uniform(-1.0, 1.0)).is_err());
        assert!(AreaIntercepts::new(2, uniform(-1.5, 1.0)).is_err());
        assert!(AreaIntercepts::new(2, uniform(0.5, 0.5)).is_err());
        let tri = BaseDistribution::Triangular {
            low: -0.5,
            mode: 0.8,
            high: 0.5,
        };
        assert!(AreaIntercepts::new(2, tri).is_err());
    }

    /// First coordinates of points drawn uniformly from the unit d-ball, sorted.
    fn ball_projections(d: usize, m: usize, rng: &mut Prng) -> Vec<f64> {
        let mut out = Vec::with_capacity(m);
        let mut g = vec![0.0; d];
        for _ in 0..m {
            for v in g.iter_mut() {
                *v = rng.gaussian();
            }
            let norm = g.iter().map(|v| v * v).sum::<f64>().sqrt();
            let r = rng.next_f64_01().powf(1.0 / d as f64);
            out.push(g[0] / norm * r);
        }
        out.sort_by(|a, b| a.total_cmp(b));
        out
    }

    /// Fraction of the ball in which a unit with intercept `c` is active.
    fn coverage(sorted_proj: &[f64], c: f64) -> f64 {
        let below = sorted_proj.partition_point(|&p| p <= c);
        (sorted_proj.len() - below) as f64 / sorted_proj.len() as f64
    }

    /// Kolmogorov-Smirnov distance of samples from Uniform(0, 1).
    fn ks_uniform(mut samples: Vec<f64>) -> f64 {
        samples.sort_by(|a, b| a.total_cmp(b));
        let n = samples.len() as f64;
        samples
            .iter()
            .enumerate()
            .map(|(i, &f)| ((i as f64 + 1.0) / n - f).max(f - i as f64 / n))
            .fold(0.0, f64::max)
    }

    #[test]
    fn transformed_coverage_stays_uniform_as_dimension_grows() {
        let mut rng = Prng::new(42);
        let n_units = 1000;
        let mut raw_ks = Vec::new();

        for d in [1usize, 4, 12] {
            let proj = ball_projections(d, 20_000, &mut rng);
            let dist = AreaIntercepts::new(d, uniform(-1.0, 1.0)).unwrap();

            let transformed: Vec<f64> = dist
                .sample(n_units, &mut rng)
                .into_iter()
                .map(|c| coverage(&proj, c))
                .collect();
            let raw: Vec<f64> = (0..n_units)
                .map(|_| coverage(&proj, rng.gen_range_f64(-1.0, 1.0)))
                .collect();

            let t = ks_uniform(transformed);
            let r = ks_uniform(raw);
            assert!(t < 0.08, "d={d} transformed ks={t}");
            raw_ks.push(r);
        }

        // Raw intercepts drift away from uniform coverage with dimension.
        assert!(raw_ks[0] < 0.08, "raw d=1 ks={}", raw_ks[0]);
        assert!(raw_ks[2] > raw_ks[1], "{raw_ks:?}");
        assert!(raw_ks[2] > 0.18, "{raw_ks:?}");
    }
}
