//! Online learning: PES (prescribed error sensitivity) on the population
//! to output transform.
//!
//! The training signal is shaped in a fixed order every step:
//! 1. low-pass filtered by the error synapse,
//! 2. gated (optional): norms above the threshold are rescaled to half the
//!    threshold,
//! 3. sign-inverted, since the signal is an error to minimize.
//!
//! The update is then `ΔW = −(κ·dt/n) · e ⊗ a`, once per step.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::ConfigError;
use crate::kernels;
use crate::storage::WeightMatrix;
use crate::synapse::Lowpass;

/// Starting point of a learned transform.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialTransform {
    /// Learn from scratch.
    Zero,
    /// Start from a provided `(joints × neurons)` transform, e.g. a checkpoint.
    Fixed(WeightMatrix),
}

impl InitialTransform {
    pub fn from_checkpoint(weights: WeightMatrix) -> Self {
        if weights.is_zero() {
            Self::Zero
        } else {
            Self::Fixed(weights)
        }
    }
}

/// Clamp on the training-error norm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorGate {
    pub threshold: f64,
}

impl Default for ErrorGate {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }
}

impl ErrorGate {
    pub const DEFAULT_THRESHOLD: f64 = 2.0;

    /// Rescale `error` in place to norm `threshold / 2` when its norm exceeds
    /// `threshold`. Returns whether the gate fired.
    pub fn apply(&self, error: &mut [f64]) -> bool {
        let n = kernels::norm(error);
        if n > self.threshold {
            let scale = 0.5 * self.threshold / n;
            for e in error.iter_mut() {
                *e *= scale;
            }
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PesRule {
    pub learning_rate: f64,
    pub gate: Option<ErrorGate>,
}

impl PesRule {
    /// Gate and invert an already filtered training signal into `error`.
    pub fn shape_error(&self, filtered: &[f64], error: &mut [f64]) {
        error.copy_from_slice(filtered);
        if let Some(gate) = &self.gate {
            gate.apply(error);
        }
        for e in error.iter_mut() {
            *e = -*e;
        }
    }

    #[inline]
    fn step_scale(&self, dt: f64, n_neurons: usize) -> f64 {
        -self.learning_rate * dt / n_neurons.max(1) as f64
    }

    /// `W += −(κ·dt/n) · error ⊗ activity`
    pub fn update(&self, weights: &mut WeightMatrix, error: &[f64], activity: &[f64], dt: f64) {
        let alpha = self.step_scale(dt, weights.cols());
        for (r, &e) in error.iter().enumerate() {
            if e != 0.0 {
                kernels::axpy(alpha * e, activity, weights.row_mut(r));
            }
        }
    }

    #[cfg(feature = "parallel")]
    pub fn update_parallel(
        &self,
        weights: &mut WeightMatrix,
        error: &[f64],
        activity: &[f64],
        dt: f64,
    ) {
        let cols = weights.cols();
        let alpha = self.step_scale(dt, cols);
        weights
            .as_mut_slice()
            .par_chunks_mut(cols)
            .zip(error.par_iter())
            .for_each(|(row, &e)| {
                if e != 0.0 {
                    kernels::axpy(alpha * e, activity, row);
                }
            });
    }
}

/// Learned connection from one population to the shared output.
#[derive(Debug, Clone)]
pub struct LearnedConnection {
    weights: WeightMatrix,
    rule: PesRule,
    error_filter: Lowpass,
    error: Vec<f64>,
}

impl LearnedConnection {
    pub fn new(
        initial: InitialTransform,
        joints: usize,
        neurons: usize,
        rule: PesRule,
        error_synapse: f64,
        dt: f64,
    ) -> Result<Self, ConfigError> {
        let weights = match initial {
            InitialTransform::Zero => WeightMatrix::zeros(joints, neurons),
            InitialTransform::Fixed(w) => {
                if w.shape() != (joints, neurons) {
                    return Err(ConfigError::invalid(
                        "initial_transform",
                        format!(
                            "shape {:?} does not match ({joints}, {neurons})",
                            w.shape()
                        ),
                    ));
                }
                w
            }
        };
        Ok(Self {
            weights,
            rule,
            error_filter: Lowpass::new(error_synapse, dt, joints),
            error: vec![0.0; joints],
        })
    }

    pub fn weights(&self) -> &WeightMatrix {
        &self.weights
    }

    pub fn rule(&self) -> &PesRule {
        &self.rule
    }

    /// The error fed to the rule on the latest step.
    pub fn last_error(&self) -> &[f64] {
        &self.error
    }

    /// `out += W · activity`
    pub fn decode_into(&self, activity: &[f64], out: &mut [f64]) {
        for (r, o) in out.iter_mut().enumerate() {
            *o += kernels::dot(self.weights.row(r), activity);
        }
    }

    fn prepare_error(&mut self, training_signal: &[f64]) {
        let filtered = self.error_filter.filter(training_signal);
        self.rule.shape_error(filtered, &mut self.error);
    }

    pub fn learn(&mut self, training_signal: &[f64], activity: &[f64], dt: f64) {
        self.prepare_error(training_signal);
        self.rule
            .update(&mut self.weights, &self.error, activity, dt);
    }

    #[cfg(feature = "parallel")]
    pub fn learn_parallel(&mut self, training_signal: &[f64], activity: &[f64], dt: f64) {
        self.prepare_error(training_signal);
        self.rule
            .update_parallel(&mut self.weights, &self.error, activity, dt);
    }
}
