//! Adaptive populations: groups of LIF units over the encoded feedback.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tracing::warn;

use crate::error::ConfigError;
use crate::intercepts::AreaIntercepts;
use crate::kernels;
use crate::neurons::{LifParams, ResponseMode, UnitResponse};
use crate::prng::Prng;

/// How preferred directions are spread over the input hypersphere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum EncoderPlacement {
    /// Low-discrepancy covering of the sphere (requires `scattered` feature).
    #[default]
    Scattered,
    /// Independent uniformly random directions.
    Random,
}

impl fmt::Display for EncoderPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scattered => "scattered",
            Self::Random => "random",
        })
    }
}

impl FromStr for EncoderPlacement {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scattered" => Ok(Self::Scattered),
            "random" => Ok(Self::Random),
            other => Err(ConfigError::invalid(
                "encoder_placement",
                format!("unknown placement {other:?}"),
            )),
        }
    }
}

impl EncoderPlacement {
    /// The placement that will actually be used in this build.
    pub fn effective(self) -> EncoderPlacement {
        match self {
            Self::Random => Self::Random,
            Self::Scattered => {
                #[cfg(feature = "scattered")]
                {
                    Self::Scattered
                }
                #[cfg(not(feature = "scattered"))]
                {
                    Self::Random
                }
            }
        }
    }
}

/// Everything needed to build one population.
#[derive(Debug, Clone)]
pub struct PopulationParams {
    pub n_neurons: usize,
    pub intercepts: AreaIntercepts,
    /// Maximum firing rates are drawn uniformly from this range (Hz).
    pub max_rates: (f64, f64),
    pub mode: ResponseMode,
    pub placement: EncoderPlacement,
    pub lif: LifParams,
    pub dt: f64,
}

impl PopulationParams {
    pub fn dimensions(&self) -> usize {
        self.intercepts.dimensions()
    }
}

#[derive(Debug, Clone)]
pub struct AdaptivePopulation {
    n_neurons: usize,
    dimensions: usize,
    /// Row-major `(n_neurons × dimensions)`, unit-length rows.
    encoders: Vec<f64>,
    intercepts: Vec<f64>,
    gain: Vec<f64>,
    bias: Vec<f64>,
    response: UnitResponse,
    placement: EncoderPlacement,

    currents: Vec<f64>,
    activity: Vec<f64>,
}

impl AdaptivePopulation {
    pub fn new(params: &PopulationParams, rng: &mut Prng) -> Self {
        let n = params.n_neurons;
        let d = params.dimensions();

        let placement = params.placement.effective();
        if placement != params.placement {
            warn!(
                requested = %params.placement,
                using = %placement,
                "optimized encoder placement unavailable in this build; unit placement will be sub-optimal"
            );
        }
        let encoders = match placement {
            #[cfg(feature = "scattered")]
            EncoderPlacement::Scattered => scattered_encoders(n, d, rng),
            _ => random_encoders(n, d, rng),
        };

        let intercepts = params.intercepts.sample(n, rng);
        let (lo, hi) = params.max_rates;
        let mut gain = Vec::with_capacity(n);
        let mut bias = Vec::with_capacity(n);
        for &c in &intercepts {
            let max_rate = rng.gen_range_f64(lo, hi);
            let (g, b) = params.lif.gain_bias(max_rate, c);
            gain.push(g);
            bias.push(b);
        }

        let response = UnitResponse::new(params.mode, params.lif, params.dt, n, rng);

        Self {
            n_neurons: n,
            dimensions: d,
            encoders,
            intercepts,
            gain,
            bias,
            response,
            placement,
            currents: vec![0.0; n],
            activity: vec![0.0; n],
        }
    }

    pub fn n_neurons(&self) -> usize {
        self.n_neurons
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn intercepts(&self) -> &[f64] {
        &self.intercepts
    }

    pub fn encoder(&self, i: usize) -> &[f64] {
        &self.encoders[i * self.dimensions..(i + 1) * self.dimensions]
    }

    pub fn placement(&self) -> EncoderPlacement {
        self.placement
    }

    pub fn mode(&self) -> ResponseMode {
        self.response.mode()
    }

    /// Activities (Hz) from the latest step.
    pub fn activity(&self) -> &[f64] {
        &self.activity
    }

    /// Fraction of units with non-zero activity in the latest step.
    pub fn active_fraction(&self) -> f64 {
        if self.n_neurons == 0 {
            return 0.0;
        }
        let active = self.activity.iter().filter(|&&a| a > 0.0).count();
        active as f64 / self.n_neurons as f64
    }

    /// Advance one step with input `x` (length `dimensions`).
    pub fn step(&mut self, x: &[f64]) -> &[f64] {
        let d = self.dimensions;
        for (i, j) in self.currents.iter_mut().enumerate() {
            let e = &self.encoders[i * d..(i + 1) * d];
            *j = self.gain[i] * kernels::dot(e, x) + self.bias[i];
        }
        self.response.respond(&self.currents, &mut self.activity);
        &self.activity
    }

    /// Same as [`Self::step`], spread over the rayon pool.
    #[cfg(feature = "parallel")]
    pub fn step_parallel(&mut self, x: &[f64]) -> &[f64] {
        let d = self.dimensions;
        let encoders = &self.encoders;
        let gain = &self.gain;
        let bias = &self.bias;
        self.currents
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, j)| {
                let e = &encoders[i * d..(i + 1) * d];
                *j = gain[i] * kernels::dot(e, x) + bias[i];
            });
        self.response
            .respond_parallel(&self.currents, &mut self.activity);
        &self.activity
    }

    /// Steady-state rates for input `x`, without touching spiking state.
    pub fn rates_for(&self, x: &[f64], out: &mut [f64]) {
        let d = self.dimensions;
        let lif = self.response.params();
        for (i, o) in out.iter_mut().enumerate() {
            let e = &self.encoders[i * d..(i + 1) * d];
            *o = lif.rate(self.gain[i] * kernels::dot(e, x) + self.bias[i]);
        }
    }
}

fn normalize_or_axis(v: &mut [f64]) {
    let n = kernels::norm(v);
    if n > 0.0 && n.is_finite() {
        for x in v.iter_mut() {
            *x /= n;
        }
    } else {
        v.fill(0.0);
        v[0] = 1.0;
    }
}

fn random_encoders(n: usize, d: usize, rng: &mut Prng) -> Vec<f64> {
    let mut out = vec![0.0; n * d];
    for row in out.chunks_mut(d) {
        for x in row.iter_mut() {
            *x = rng.gaussian();
        }
        normalize_or_axis(row);
    }
    out
}

/// Points on the sphere from an R_d low-discrepancy sequence pushed through
/// the inverse normal CDF, then normalized.
#[cfg(feature = "scattered")]
fn scattered_encoders(n: usize, d: usize, rng: &mut Prng) -> Vec<f64> {
    // Generalized golden ratio: the positive root of x^(d+1) = x + 1.
    let mut phi = 2.0f64;
    for _ in 0..64 {
        phi = (1.0 + phi).powf(1.0 / (d as f64 + 1.0));
    }
    let alpha: Vec<f64> = (1..=d).map(|k| phi.powi(-(k as i32))).collect();
    let offset = rng.next_f64_01();

    let mut out = vec![0.0; n * d];
    for (i, row) in out.chunks_mut(d).enumerate() {
        for (x, a) in row.iter_mut().zip(&alpha) {
            let u = (offset + (i as f64 + 1.0) * a).fract();
            *x = inverse_normal_cdf(u);
        }
        normalize_or_axis(row);
    }
    out
}

/// Acklam's rational approximation of the standard normal quantile.
#[cfg(feature = "scattered")]
fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    let p = p.clamp(1e-12, 1.0 - 1e-12);
    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercepts::BaseDistribution;

    fn params(n: usize, d: usize, placement: EncoderPlacement) -> PopulationParams {
        PopulationParams {
            n_neurons: n,
            intercepts: AreaIntercepts::new(
                d,
                BaseDistribution::Uniform {
                    low: -1.0,
                    high: 1.0,
                },
            )
            .unwrap(),
            max_rates: (200.0, 400.0),
            mode: ResponseMode::ContinuousRate,
            placement,
            lif: LifParams::default(),
            dt: 0.001,
        }
    }

    #[test]
    fn encoders_are_unit_length() {
        let mut rng = Prng::new(1);
        for placement in [EncoderPlacement::Scattered, EncoderPlacement::Random] {
            let pop = AdaptivePopulation::new(&params(64, 3, placement), &mut rng);
            for i in 0..pop.n_neurons() {
                assert!((kernels::norm(pop.encoder(i)) - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn same_seed_builds_identical_population() {
        let a = AdaptivePopulation::new(&params(32, 2, EncoderPlacement::Random), &mut Prng::new(9));
        let b = AdaptivePopulation::new(&params(32, 2, EncoderPlacement::Random), &mut Prng::new(9));
        assert_eq!(a.intercepts(), b.intercepts());
        assert_eq!(a.encoder(5), b.encoder(5));
    }

    #[test]
    fn units_fire_only_past_their_intercept() {
        let mut rng = Prng::new(2);
        let mut pop = AdaptivePopulation::new(&params(200, 2, EncoderPlacement::Random), &mut rng);
        let x = [0.6, -0.3];
        let act = pop.step(&x).to_vec();
        for i in 0..pop.n_neurons() {
            let proj = kernels::dot(pop.encoder(i), &x);
            let c = pop.intercepts()[i];
            if proj < c - 1e-9 {
                assert_eq!(act[i], 0.0, "unit {i} proj {proj} intercept {c}");
            } else if proj > c + 1e-9 {
                assert!(act[i] > 0.0);
                assert!(act[i] <= LifParams::default().max_possible_rate());
            }
        }
        let f = pop.active_fraction();
        assert!(f > 0.0 && f < 1.0);
    }

    #[test]
    fn rates_for_matches_rate_mode_step() {
        let mut rng = Prng::new(3);
        let mut pop = AdaptivePopulation::new(&params(50, 4, EncoderPlacement::Random), &mut rng);
        let x = [0.1, 0.2, -0.4, 0.0];
        let mut rates = vec![0.0; 50];
        pop.rates_for(&x, &mut rates);
        assert_eq!(pop.step(&x), rates.as_slice());
    }

    #[cfg(feature = "scattered")]
    #[test]
    fn scattered_placement_covers_both_poles_in_one_dimension() {
        let mut rng = Prng::new(4);
        let pop = AdaptivePopulation::new(&params(40, 1, EncoderPlacement::Scattered), &mut rng);
        let pos = (0..40).filter(|&i| pop.encoder(i)[0] > 0.0).count();
        assert!((15..=25).contains(&pos), "pos={pos}");
    }

    #[cfg(feature = "scattered")]
    #[test]
    fn scattered_placement_is_more_balanced_than_random() {
        let n = 400;
        let d = 3;
        let mean_norm = |pop: &AdaptivePopulation| {
            let mut mean = vec![0.0; d];
            for i in 0..n {
                kernels::axpy(1.0 / n as f64, pop.encoder(i), &mut mean);
            }
            kernels::norm(&mean)
        };
        let mut worst_scattered = 0.0f64;
        let mut avg_random = 0.0;
        for seed in 1..=8u64 {
            let s = AdaptivePopulation::new(&params(n, d, EncoderPlacement::Scattered), &mut Prng::new(seed));
            let r = AdaptivePopulation::new(&params(n, d, EncoderPlacement::Random), &mut Prng::new(seed));
            worst_scattered = worst_scattered.max(mean_norm(&s));
            avg_random += mean_norm(&r) / 8.0;
        }
        assert!(worst_scattered < avg_random, "{worst_scattered} vs {avg_random}");
    }

    #[cfg(not(feature = "scattered"))]
    #[test]
    fn scattered_request_degrades_to_random() {
        let pop = AdaptivePopulation::new(&params(8, 2, EncoderPlacement::Scattered), &mut Prng::new(1));
        assert_eq!(pop.placement(), EncoderPlacement::Random);
    }

    #[cfg(feature = "scattered")]
    #[test]
    fn inverse_normal_cdf_is_accurate() {
        assert!(inverse_normal_cdf(0.5).abs() < 1e-9);
        assert!((inverse_normal_cdf(0.975) - 1.959_963_985).abs() < 1e-6);
        assert!((inverse_normal_cdf(0.01) + 2.326_347_874).abs() < 1e-6);
    }
}
