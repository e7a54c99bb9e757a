//! The adaptive network: feedback encoder, populations and learned
//! connections, advanced one timestep at a time.
//!
//! Per step:
//! 1. encode `(q, dq)` and pass it through the input synapse,
//! 2. every population responds to the same filtered feedback,
//! 3. each population's filtered activity is decoded through its transform
//!    and summed into the corrective output,
//! 4. each transform is updated once from the shaped training error.

use tracing::debug;

use crate::config::AdaptationConfig;
use crate::ensemble::{AdaptivePopulation, PopulationParams};
use crate::error::{AdaptError, ConfigError};
use crate::feedback::{FeedbackEncoder, JointState};
use crate::intercepts::AreaIntercepts;
use crate::learning::{ErrorGate, InitialTransform, LearnedConnection, PesRule};
use crate::neurons::LifParams;
use crate::prng::Prng;
use crate::robot::RobotConfig;
use crate::storage::WeightMatrix;
use crate::synapse::Lowpass;

/// How a single step is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionTier {
    /// Single-threaded; inner loops use `wide` when the `simd` feature is on.
    #[default]
    Scalar,
    /// Units spread over the rayon pool (requires `parallel` feature).
    Parallel,
}

impl ExecutionTier {
    /// The tier that will actually run in this build.
    pub fn effective(self) -> ExecutionTier {
        match self {
            Self::Scalar => Self::Scalar,
            Self::Parallel => {
                #[cfg(feature = "parallel")]
                {
                    Self::Parallel
                }
                #[cfg(not(feature = "parallel"))]
                {
                    Self::Scalar
                }
            }
        }
    }
}

/// Inputs for one control tick. Owned so a free-running engine can hold the
/// latest values between caller updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickInputs {
    pub q: Vec<f64>,
    pub dq: Vec<f64>,
    pub training_signal: Vec<f64>,
}

impl TickInputs {
    pub fn zeros(n_joints: usize) -> Self {
        Self {
            q: vec![0.0; n_joints],
            dq: vec![0.0; n_joints],
            training_signal: vec![0.0; n_joints],
        }
    }

    /// Reject inputs that do not have one component per joint. `dq` is only
    /// checked when velocity feedback is in use.
    pub fn check(
        q: &[f64],
        dq: &[f64],
        training_signal: &[f64],
        n_joints: usize,
        needs_dq: bool,
    ) -> Result<(), AdaptError> {
        let checks = [
            ("q", q.len(), true),
            ("dq", dq.len(), needs_dq),
            ("training_signal", training_signal.len(), true),
        ];
        for (name, actual, required) in checks {
            if required && actual != n_joints {
                return Err(AdaptError::DimensionMismatch {
                    name,
                    expected: n_joints,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Overwrite in place after [`Self::check`]. An unchecked `dq` of the
    /// wrong length is stored as zeros.
    pub fn store(&mut self, q: &[f64], dq: &[f64], training_signal: &[f64]) {
        self.q.copy_from_slice(q);
        if dq.len() == self.dq.len() {
            self.dq.copy_from_slice(dq);
        } else {
            self.dq.fill(0.0);
        }
        self.training_signal.copy_from_slice(training_signal);
    }
}

/// Snapshot of the network's internal state for logging and tests.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NetworkDiagnostics {
    pub steps: u64,
    /// Fraction of units active in the latest step, per population.
    pub active_fraction: Vec<f64>,
    /// Frobenius norm of each learned transform.
    pub weight_norms: Vec<f64>,
    pub output_norm: f64,
}

pub struct AdaptiveNetwork {
    robot: Box<dyn RobotConfig>,
    n_joints: usize,
    dt: f64,

    encoder: FeedbackEncoder,
    encoded: Vec<f64>,
    input_filter: Lowpass,

    populations: Vec<AdaptivePopulation>,
    activity_filters: Vec<Lowpass>,
    connections: Vec<LearnedConnection>,

    output: Vec<f64>,
    steps: u64,
}

impl core::fmt::Debug for AdaptiveNetwork {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AdaptiveNetwork")
            .field("n_joints", &self.n_joints)
            .field("dimensions", &self.encoder.dimensions())
            .field("populations", &self.populations.len())
            .field("steps", &self.steps)
            .finish()
    }
}

impl AdaptiveNetwork {
    /// Build the topology. `initial` holds one starting transform per
    /// population.
    pub fn build(
        robot: Box<dyn RobotConfig>,
        cfg: &AdaptationConfig,
        initial: Vec<InitialTransform>,
        rng: &mut Prng,
    ) -> Result<Self, ConfigError> {
        let n_joints = robot.n_joints();
        if n_joints == 0 {
            return Err(ConfigError::invalid("robot", "at least one joint is required"));
        }
        if initial.len() != cfg.n_adapt_pop {
            return Err(ConfigError::invalid(
                "initial_transform",
                format!(
                    "{} transforms for {} populations",
                    initial.len(),
                    cfg.n_adapt_pop
                ),
            ));
        }

        let encoder = FeedbackEncoder::new(n_joints, cfg.use_velocity);
        let dims = encoder.dimensions();
        let params = PopulationParams {
            n_neurons: cfg.n_neurons,
            intercepts: AreaIntercepts::new(dims, cfg.intercept_base())?,
            max_rates: cfg.max_rates,
            mode: cfg.unit_response_mode,
            placement: cfg.encoder_placement,
            lif: LifParams::default(),
            dt: cfg.dt,
        };
        let rule = PesRule {
            learning_rate: cfg.learning_rate,
            gate: cfg.error_gating.then(ErrorGate::default),
        };

        let mut populations = Vec::with_capacity(cfg.n_adapt_pop);
        let mut activity_filters = Vec::with_capacity(cfg.n_adapt_pop);
        let mut connections = Vec::with_capacity(cfg.n_adapt_pop);
        for (ii, init) in initial.into_iter().enumerate() {
            let mut pop_rng = rng.fork(ii as u64);
            populations.push(AdaptivePopulation::new(&params, &mut pop_rng));
            activity_filters.push(Lowpass::new(cfg.activity_synapse, cfg.dt, cfg.n_neurons));
            connections.push(LearnedConnection::new(
                init,
                n_joints,
                cfg.n_neurons,
                rule,
                cfg.error_synapse,
                cfg.dt,
            )?);
        }

        debug!(
            joints = n_joints,
            dimensions = dims,
            populations = populations.len(),
            neurons = cfg.n_neurons,
            "adaptive network built"
        );

        Ok(Self {
            robot,
            n_joints,
            dt: cfg.dt,
            encoded: vec![0.0; dims],
            input_filter: Lowpass::new(cfg.input_synapse, cfg.dt, dims),
            encoder,
            populations,
            activity_filters,
            connections,
            output: vec![0.0; n_joints],
            steps: 0,
        })
    }

    pub fn n_joints(&self) -> usize {
        self.n_joints
    }

    pub fn dimensions(&self) -> usize {
        self.encoder.dimensions()
    }

    pub fn uses_velocity(&self) -> bool {
        self.encoder.inputs_per_joint() == 2
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn populations(&self) -> &[AdaptivePopulation] {
        &self.populations
    }

    /// Corrective output from the latest step.
    pub fn output(&self) -> &[f64] {
        &self.output
    }

    pub fn weights(&self) -> Vec<WeightMatrix> {
        self.connections.iter().map(|c| c.weights().clone()).collect()
    }

    pub fn diagnostics(&self) -> NetworkDiagnostics {
        NetworkDiagnostics {
            steps: self.steps,
            active_fraction: self.populations.iter().map(|p| p.active_fraction()).collect(),
            weight_norms: self.connections.iter().map(|c| c.weights().norm()).collect(),
            output_norm: crate::kernels::norm(&self.output),
        }
    }

    /// Advance one timestep and return the corrective output.
    pub fn step(&mut self, inputs: &TickInputs, tier: ExecutionTier) -> Result<&[f64], AdaptError> {
        TickInputs::check(
            &inputs.q,
            &inputs.dq,
            &inputs.training_signal,
            self.n_joints,
            self.uses_velocity(),
        )?;

        let Self {
            robot,
            dt,
            encoder,
            encoded,
            input_filter,
            populations,
            activity_filters,
            connections,
            output,
            ..
        } = &mut *self;
        let dt = *dt;

        encoder.encode(
            &**robot,
            JointState {
                q: &inputs.q,
                dq: &inputs.dq,
            },
            encoded,
        );
        let x = input_filter.filter(encoded);

        output.fill(0.0);
        for ((pop, filter), conn) in populations
            .iter_mut()
            .zip(activity_filters.iter_mut())
            .zip(connections.iter_mut())
        {
            let activity = match tier.effective() {
                ExecutionTier::Scalar => pop.step(x),
                #[cfg(feature = "parallel")]
                ExecutionTier::Parallel => pop.step_parallel(x),
                #[cfg(not(feature = "parallel"))]
                ExecutionTier::Parallel => pop.step(x),
            };
            let a = filter.filter(activity);
            conn.decode_into(a, output);
            match tier.effective() {
                #[cfg(feature = "parallel")]
                ExecutionTier::Parallel => conn.learn_parallel(&inputs.training_signal, a, dt),
                _ => conn.learn(&inputs.training_signal, a, dt),
            }
        }

        self.steps += 1;
        if let Some(bad) = self.output.iter().position(|v| !v.is_finite()) {
            return Err(AdaptError::RuntimeStep(format!(
                "non-finite corrective output on joint {bad} at step {}",
                self.steps
            )));
        }
        Ok(&self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::JointScaling;

    fn small_cfg() -> AdaptationConfig {
        AdaptationConfig::default()
            .with_neurons(50)
            .with_intercepts(-0.9, 0.9, None)
            .with_learning_rate(1e-4)
    }

    fn build(cfg: &AdaptationConfig, joints: usize) -> AdaptiveNetwork {
        let initial = (0..cfg.n_adapt_pop).map(|_| InitialTransform::Zero).collect();
        AdaptiveNetwork::build(
            Box::new(JointScaling::symmetric(joints)),
            cfg,
            initial,
            &mut Prng::new(10),
        )
        .unwrap()
    }

    #[test]
    fn zero_transform_gives_zero_first_output() {
        let mut net = build(&small_cfg(), 2);
        let mut inputs = TickInputs::zeros(2);
        inputs.training_signal = vec![1.0, 1.0];
        let out = net.step(&inputs, ExecutionTier::Scalar).unwrap();
        assert_eq!(out, &[0.0, 0.0]);
        assert_eq!(net.steps(), 1);
    }

    #[test]
    fn wrong_input_length_is_rejected() {
        let mut net = build(&small_cfg(), 2);
        let mut inputs = TickInputs::zeros(2);
        inputs.dq = vec![0.0; 3];
        // Velocity is not fed to the populations, so dq is not checked.
        assert!(net.step(&inputs, ExecutionTier::Scalar).is_ok());
        inputs.training_signal = vec![0.0; 1];
        assert!(matches!(
            net.step(&inputs, ExecutionTier::Scalar),
            Err(AdaptError::DimensionMismatch { name: "training_signal", .. })
        ));

        let mut net = build(&small_cfg().with_velocity(true), 2);
        let mut inputs = TickInputs::zeros(2);
        inputs.dq = vec![0.0; 3];
        match net.step(&inputs, ExecutionTier::Scalar) {
            Err(AdaptError::DimensionMismatch { name, expected, actual }) => {
                assert_eq!((name, expected, actual), ("dq", 2, 3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tiers_agree_in_rate_mode() {
        let cfg = small_cfg();
        let mut a = build(&cfg, 2);
        let mut b = build(&cfg, 2);
        let inputs = TickInputs {
            q: vec![0.3, -1.2],
            dq: vec![0.0, 0.0],
            training_signal: vec![0.5, -0.25],
        };
        for _ in 0..20 {
            let oa = a.step(&inputs, ExecutionTier::Scalar).unwrap().to_vec();
            let ob = b.step(&inputs, ExecutionTier::Parallel).unwrap().to_vec();
            for (x, y) in oa.iter().zip(&ob) {
                assert!((x - y).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn diagnostics_track_learning() {
        let mut net = build(&small_cfg(), 2);
        let mut inputs = TickInputs::zeros(2);
        inputs.training_signal = vec![1.0, 1.0];
        for _ in 0..50 {
            net.step(&inputs, ExecutionTier::Scalar).unwrap();
        }
        let d = net.diagnostics();
        assert_eq!(d.steps, 50);
        assert_eq!(d.weight_norms.len(), 1);
        assert!(d.weight_norms[0] > 0.0);
        assert!(d.active_fraction[0] > 0.0);
    }

    #[test]
    fn population_count_must_match_initial_transforms() {
        let cfg = small_cfg().with_populations(2);
        let err = AdaptiveNetwork::build(
            Box::new(JointScaling::symmetric(2)),
            &cfg,
            vec![InitialTransform::Zero],
            &mut Prng::new(1),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { .. }));
    }
}
