//! Leaky integrate-and-fire unit responses.
//!
//! Both modes share the same tuning (gain/bias derived from intercepts and
//! maximum rates), so switching between them does not change what the
//! learning rule sees beyond spike noise.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::prng::Prng;

/// Intercepts are clamped below 1 so gains stay finite.
pub const MAX_INTERCEPT: f64 = 1.0 - 1e-6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ResponseMode {
    /// Deterministic LIF rate curve.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "continuous-rate"))]
    ContinuousRate,
    /// LIF membrane integration emitting spikes of height `1/dt`.
    Spiking,
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ContinuousRate => "continuous-rate",
            Self::Spiking => "spiking",
        })
    }
}

impl FromStr for ResponseMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous-rate" | "rate" => Ok(Self::ContinuousRate),
            "spiking" | "spike" => Ok(Self::Spiking),
            other => Err(ConfigError::invalid(
                "unit_response_mode",
                format!("unknown mode {other:?}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifParams {
    /// Membrane time constant (s).
    pub tau_rc: f64,
    /// Refractory period (s).
    pub tau_ref: f64,
}

impl Default for LifParams {
    fn default() -> Self {
        Self {
            tau_rc: 0.02,
            tau_ref: 0.002,
        }
    }
}

impl LifParams {
    /// Highest rate a unit can reach.
    pub fn max_possible_rate(&self) -> f64 {
        1.0 / self.tau_ref
    }

    /// Steady-state firing rate (Hz) for input current `j`.
    #[inline]
    pub fn rate(&self, j: f64) -> f64 {
        if j > 1.0 {
            1.0 / (self.tau_ref + self.tau_rc * (1.0 / (j - 1.0)).ln_1p())
        } else {
            0.0
        }
    }

    /// Gain and bias such that a unit reaches threshold at `e·x = intercept`
    /// and fires at `max_rate` when `e·x = 1`.
    pub fn gain_bias(&self, max_rate: f64, intercept: f64) -> (f64, f64) {
        let intercept = intercept.min(MAX_INTERCEPT);
        let j_max = 1.0 / (1.0 - ((self.tau_ref - 1.0 / max_rate) / self.tau_rc).exp());
        let gain = (1.0 - j_max) / (intercept - 1.0);
        let bias = 1.0 - gain * intercept;
        (gain, bias)
    }

    /// One spiking step for a single unit. Returns `1/dt` on a spike, else 0.
    #[inline]
    fn spike_step(&self, dt: f64, j: f64, voltage: &mut f64, refractory: &mut f64) -> f64 {
        *refractory -= dt;
        let integrate_for = (dt - *refractory).clamp(0.0, dt);
        *voltage -= (j - *voltage) * (-integrate_for / self.tau_rc).exp_m1();

        if *voltage > 1.0 {
            // Sub-step spike time so the refractory period starts where the
            // threshold crossing happened.
            let overshoot = if j > 1.0 {
                self.tau_rc * (-(*voltage - 1.0) / (j - 1.0)).ln_1p()
            } else {
                0.0
            };
            *voltage = 0.0;
            *refractory = self.tau_ref + dt + overshoot;
            1.0 / dt
        } else {
            if *voltage < 0.0 {
                *voltage = 0.0;
            }
            0.0
        }
    }
}

#[derive(Debug, Clone)]
enum ResponseState {
    Rate,
    Spiking {
        voltage: Vec<f64>,
        refractory: Vec<f64>,
    },
}

/// Per-population response model: maps input currents to activities (Hz).
#[derive(Debug, Clone)]
pub struct UnitResponse {
    params: LifParams,
    dt: f64,
    state: ResponseState,
}

impl UnitResponse {
    pub fn new(mode: ResponseMode, params: LifParams, dt: f64, n: usize, rng: &mut Prng) -> Self {
        let state = match mode {
            ResponseMode::ContinuousRate => ResponseState::Rate,
            ResponseMode::Spiking => ResponseState::Spiking {
                // Random initial voltages desynchronize the population.
                voltage: (0..n).map(|_| rng.next_f64_01()).collect(),
                refractory: vec![0.0; n],
            },
        };
        Self { params, dt, state }
    }

    pub fn mode(&self) -> ResponseMode {
        match self.state {
            ResponseState::Rate => ResponseMode::ContinuousRate,
            ResponseState::Spiking { .. } => ResponseMode::Spiking,
        }
    }

    pub fn params(&self) -> &LifParams {
        &self.params
    }

    pub fn respond(&mut self, currents: &[f64], out: &mut [f64]) {
        let params = self.params;
        let dt = self.dt;
        match &mut self.state {
            ResponseState::Rate => {
                for (o, &j) in out.iter_mut().zip(currents) {
                    *o = params.rate(j);
                }
            }
            ResponseState::Spiking {
                voltage,
                refractory,
            } => {
                for (((o, &j), v), r) in out
                    .iter_mut()
                    .zip(currents)
                    .zip(voltage.iter_mut())
                    .zip(refractory.iter_mut())
                {
                    *o = params.spike_step(dt, j, v, r);
                }
            }
        }
    }

    #[cfg(feature = "parallel")]
    pub fn respond_parallel(&mut self, currents: &[f64], out: &mut [f64]) {
        let params = self.params;
        let dt = self.dt;
        match &mut self.state {
            ResponseState::Rate => {
                out.par_iter_mut()
                    .zip(currents.par_iter())
                    .for_each(|(o, &j)| *o = params.rate(j));
            }
            ResponseState::Spiking {
                voltage,
                refractory,
            } => {
                out.par_iter_mut()
                    .zip(currents.par_iter())
                    .zip(voltage.par_iter_mut())
                    .zip(refractory.par_iter_mut())
                    .for_each(|(((o, &j), v), r)| *o = params.spike_step(dt, j, v, r));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_bias_hits_threshold_and_max_rate() {
        let p = LifParams::default();
        for &(max_rate, intercept) in &[(200.0, 0.3), (350.0, -0.6), (400.0, 0.95)] {
            let (gain, bias) = p.gain_bias(max_rate, intercept);
            assert!((gain * intercept + bias - 1.0).abs() < 1e-9);
            assert!((p.rate(gain + bias) - max_rate).abs() < 1e-6);
            assert_eq!(p.rate(gain * (intercept - 0.01) + bias), 0.0);
        }
    }

    #[test]
    fn intercept_of_one_keeps_gain_finite() {
        let (gain, bias) = LifParams::default().gain_bias(300.0, 1.0);
        assert!(gain.is_finite() && bias.is_finite());
    }

    #[test]
    fn spiking_average_matches_rate_curve() {
        let p = LifParams::default();
        let dt = 0.001;
        let mut rng = Prng::new(5);
        let n = 4;
        let mut resp = UnitResponse::new(ResponseMode::Spiking, p, dt, n, &mut rng);
        let currents = vec![1.5, 3.0, 6.0, 0.5];
        let mut out = vec![0.0; n];
        let mut totals = vec![0.0; n];
        let steps = 5000;
        for _ in 0..steps {
            resp.respond(&currents, &mut out);
            for (t, o) in totals.iter_mut().zip(&out) {
                *t += o * dt;
            }
        }
        let seconds = steps as f64 * dt;
        for (i, &j) in currents.iter().enumerate() {
            let measured = totals[i] / seconds;
            let expected = p.rate(j);
            assert!(
                (measured - expected).abs() <= 0.03 * expected + 1.0,
                "unit {i}: measured {measured} expected {expected}"
            );
        }
    }

    #[test]
    fn mode_parses_from_config_names() {
        assert_eq!(
            "continuous-rate".parse::<ResponseMode>().unwrap(),
            ResponseMode::ContinuousRate
        );
        assert_eq!("Spiking".parse::<ResponseMode>().unwrap(), ResponseMode::Spiking);
        assert!("lif".parse::<ResponseMode>().is_err());
    }
}
