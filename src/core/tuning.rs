//! Offline search for intercept distributions.
//!
//! Every candidate triangular base `(low, mode, high)` builds a population,
//! runs it over a recorded feedback signal and histograms how much of the
//! time each unit is active. Candidates are ranked by their distance to an
//! ideal profile: about 10% of units almost never active, tapering linearly
//! to none active more than 60% of the time.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::Serialize;

use tracing::debug;

use crate::ensemble::{AdaptivePopulation, EncoderPlacement, PopulationParams};
use crate::error::ConfigError;
use crate::intercepts::{AreaIntercepts, BaseDistribution};
use crate::neurons::{LifParams, ResponseMode};
use crate::prng::Prng;

/// One triangular base distribution to try.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Candidate {
    pub low: f64,
    pub high: f64,
    pub mode: f64,
}

impl Candidate {
    pub fn base(&self) -> BaseDistribution {
        BaseDistribution::Triangular {
            low: self.low,
            mode: self.mode,
            high: self.high,
        }
    }
}

/// Every `(low, high, mode)` with bounds on −0.9..=0.9 in steps of 0.1, modes
/// on −0.9..=0.9 in steps of 0.2, `low < high` and `low <= mode <= high`.
pub fn candidate_triangles() -> Vec<Candidate> {
    let mut out = Vec::new();
    // Work in tenths so the grid is exact.
    for low in -9i32..=9 {
        for high in (low + 1)..=9 {
            for mode in (-9i32..=9).step_by(2) {
                if low <= mode && mode <= high {
                    out.push(Candidate {
                        low: low as f64 / 10.0,
                        high: high as f64 / 10.0,
                        mode: mode as f64 / 10.0,
                    });
                }
            }
        }
    }
    out
}

/// Target histogram over `n_edges - 1` equal bins of "fraction of time
/// active" on [0, 1]: a ramp from `0.1·n_neurons` down to 0 across the first
/// 60% of the bins, then zeros.
pub fn ideal_profile(n_neurons: usize, n_edges: usize) -> Vec<f64> {
    let n_bins = n_edges.saturating_sub(1);
    let n_line = ((0.6 * n_edges as f64) as usize).min(n_bins);
    let start = 0.1 * n_neurons as f64;

    let mut out = Vec::with_capacity(n_bins);
    for i in 0..n_line {
        let t = if n_line > 1 {
            i as f64 / (n_line - 1) as f64
        } else {
            0.0
        };
        out.push(start * (1.0 - t));
    }
    out.resize(n_bins, 0.0);
    out
}

/// Per unit, the fraction of `inputs` for which its steady-state rate is
/// non-zero.
pub fn proportion_time_active(population: &AdaptivePopulation, inputs: &[Vec<f64>]) -> Vec<f64> {
    let n = population.n_neurons();
    let mut counts = vec![0usize; n];
    let mut rates = vec![0.0; n];
    for x in inputs {
        population.rates_for(x, &mut rates);
        for (c, &r) in counts.iter_mut().zip(&rates) {
            if r > 0.0 {
                *c += 1;
            }
        }
    }
    let total = inputs.len().max(1) as f64;
    counts.into_iter().map(|c| c as f64 / total).collect()
}

/// Counts of `values` in `n_edges - 1` equal bins over [0, 1]; the last bin
/// includes 1.
pub fn histogram_unit(values: &[f64], n_edges: usize) -> Vec<usize> {
    let n_bins = n_edges.saturating_sub(1);
    let mut out = vec![0usize; n_bins];
    if n_bins == 0 {
        return out;
    }
    for &v in values {
        if !(0.0..=1.0).contains(&v) {
            continue;
        }
        let idx = ((v * n_bins as f64) as usize).min(n_bins - 1);
        out[idx] += 1;
    }
    out
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub n_neurons: usize,
    pub seed: u64,
    pub n_edges: usize,
    pub placement: EncoderPlacement,
    /// Evaluate only the first `limit` candidates.
    pub limit: Option<usize>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            n_neurons: 1000,
            seed: 10,
            n_edges: 100,
            placement: EncoderPlacement::Scattered,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ScanResult {
    pub candidate: Candidate,
    /// Sum of absolute differences to the ideal profile.
    pub error: f64,
    pub num_active: usize,
    pub num_inactive: usize,
    pub neurons_active: Vec<usize>,
}

/// Evaluate one candidate against a feedback signal.
pub fn evaluate(
    candidate: Candidate,
    inputs: &[Vec<f64>],
    dimensions: usize,
    settings: &ScanSettings,
    ideal: &[f64],
) -> Result<ScanResult, ConfigError> {
    let params = PopulationParams {
        n_neurons: settings.n_neurons,
        intercepts: AreaIntercepts::new(dimensions, candidate.base())?,
        max_rates: (200.0, 400.0),
        mode: ResponseMode::ContinuousRate,
        placement: settings.placement,
        lif: LifParams::default(),
        dt: 0.001,
    };
    let population = AdaptivePopulation::new(&params, &mut Prng::new(settings.seed));
    let time_active = proportion_time_active(&population, inputs);

    let num_inactive = time_active.iter().filter(|&&t| t == 0.0).count();
    let neurons_active = histogram_unit(&time_active, settings.n_edges);
    let error = ideal
        .iter()
        .zip(&neurons_active)
        .map(|(i, &n)| (i - n as f64).abs())
        .sum();

    Ok(ScanResult {
        candidate,
        error,
        num_active: settings.n_neurons - num_inactive,
        num_inactive,
        neurons_active,
    })
}

/// Evaluate the candidate grid over `inputs` (scaled feedback vectors, all of
/// the same length) and return results best first.
pub fn scan(inputs: &[Vec<f64>], settings: &ScanSettings) -> Result<Vec<ScanResult>, ConfigError> {
    let dimensions = match inputs.first() {
        Some(x) if !x.is_empty() => x.len(),
        _ => return Err(ConfigError::invalid("inputs", "need at least one non-empty sample")),
    };
    if inputs.iter().any(|x| x.len() != dimensions) {
        return Err(ConfigError::invalid("inputs", "samples differ in length"));
    }

    let mut candidates = candidate_triangles();
    if let Some(limit) = settings.limit {
        candidates.truncate(limit);
    }
    let ideal = ideal_profile(settings.n_neurons, settings.n_edges);
    debug!(candidates = candidates.len(), dimensions, "intercept scan");

    #[cfg(feature = "parallel")]
    let iter = candidates.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = candidates.iter();

    let mut results = iter
        .map(|&c| evaluate(c, inputs, dimensions, settings, &ideal))
        .collect::<Result<Vec<_>, _>>()?;
    results.sort_by(|a, b| a.error.total_cmp(&b.error));
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_grid_respects_ordering() {
        let grid = candidate_triangles();
        assert!(!grid.is_empty());
        for c in &grid {
            assert!(c.low < c.high);
            assert!(c.low <= c.mode && c.mode <= c.high);
            assert!(c.base().validate().is_ok());
        }
        assert!(grid.contains(&Candidate {
            low: -0.9,
            high: 0.9,
            mode: -0.1
        }));
        // Modes sit on odd tenths only.
        assert!(!grid.iter().any(|c| (c.mode * 10.0).round() as i32 % 2 == 0));
    }

    #[test]
    fn ideal_profile_ramps_then_flattens() {
        let p = ideal_profile(1000, 100);
        assert_eq!(p.len(), 99);
        assert!((p[0] - 100.0).abs() < 1e-12);
        assert!(p[59].abs() < 1e-12);
        assert!(p[..60].windows(2).all(|w| w[0] >= w[1]));
        assert!(p[60..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn histogram_includes_upper_edge() {
        let h = histogram_unit(&[0.0, 0.49, 0.5, 1.0, 1.5], 3);
        assert_eq!(h, vec![2, 2]);
    }

    #[test]
    fn proportion_active_counts_samples() {
        let params = PopulationParams {
            n_neurons: 20,
            intercepts: AreaIntercepts::new(
                1,
                BaseDistribution::Uniform {
                    low: -0.5,
                    high: 0.5,
                },
            )
            .unwrap(),
            max_rates: (200.0, 400.0),
            mode: ResponseMode::ContinuousRate,
            placement: EncoderPlacement::Random,
            lif: LifParams::default(),
            dt: 0.001,
        };
        let pop = AdaptivePopulation::new(&params, &mut Prng::new(3));
        let inputs = vec![vec![1.0], vec![-1.0]];
        let p = proportion_time_active(&pop, &inputs);
        // In one dimension an encoder is ±1, so every unit is active for
        // exactly one of the two extremes.
        assert!(p.iter().all(|&v| (v - 0.5).abs() < 1e-12), "{p:?}");
    }

    #[test]
    fn scan_ranks_best_first() {
        let inputs: Vec<Vec<f64>> = (0..200)
            .map(|i| {
                let t = i as f64 * 0.05;
                vec![0.8 * t.sin(), 0.6 * (0.7 * t).cos()]
            })
            .collect();
        let settings = ScanSettings {
            n_neurons: 40,
            n_edges: 20,
            limit: Some(12),
            ..ScanSettings::default()
        };
        let results = scan(&inputs, &settings).unwrap();
        assert_eq!(results.len(), 12);
        assert!(results.windows(2).all(|w| w[0].error <= w[1].error));
        for r in &results {
            assert_eq!(r.num_active + r.num_inactive, 40);
            assert_eq!(r.neurons_active.len(), 19);
        }
        assert!(scan(&[], &settings).is_err());
    }
}
