//! The adaptive dynamics-compensation module.
//!
//! ```no_run
//! use dynadapt::prelude::*;
//!
//! let robot = JointScaling::symmetric(2);
//! let cfg = AdaptationConfig::default().with_neurons(500);
//! let mut adapt = DynamicsAdaptation::new(Box::new(robot), cfg)?;
//!
//! let (q, dq) = ([0.1, -0.4], [0.0, 0.0]);
//! let training_signal = [0.02, -0.01];
//! let u_adapt = adapt.generate(&q, &dq, &training_signal)?;
//! assert_eq!(u_adapt.len(), 2);
//! # Ok::<(), AdaptError>(())
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(feature = "serde")]
use serde::Serialize;

use tracing::{error, info};

use crate::backend::{start_engine, Engine, ExecutionBackend};
use crate::config::AdaptationConfig;
use crate::error::{AdaptError, ConfigError};
use crate::learning::InitialTransform;
use crate::network::{AdaptiveNetwork, NetworkDiagnostics, TickInputs};
use crate::prng::Prng;
use crate::robot::RobotConfig;
use crate::storage::{self, WeightMatrix};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum DriverState {
    Ready,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Diagnostics {
    pub backend: ExecutionBackend,
    pub state: DriverState,
    /// `generate` calls served.
    pub calls: u64,
    pub network: NetworkDiagnostics,
}

pub struct DynamicsAdaptation {
    cfg: AdaptationConfig,
    n_joints: usize,
    uses_velocity: bool,
    inputs: TickInputs,
    engine: Box<dyn Engine>,
    state: DriverState,
    calls: u64,
}

impl core::fmt::Debug for DynamicsAdaptation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DynamicsAdaptation")
            .field("backend", &self.engine.backend())
            .field("n_joints", &self.n_joints)
            .field("state", &self.state)
            .field("calls", &self.calls)
            .finish()
    }
}

impl DynamicsAdaptation {
    /// Build the network, load any checkpoints and start the engine.
    ///
    /// Everything that can be rejected (parameters, robot description,
    /// backend name, backend availability, checkpoint shape) is checked before the engine starts.
    pub fn new(robot: Box<dyn RobotConfig>, cfg: AdaptationConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        robot.validate()?;
        let backend = cfg.backend()?;
        backend.ensure_available()?;

        let n_joints = robot.n_joints();
        let initial = (0..cfg.n_adapt_pop)
            .map(|ii| {
                storage::load_transform(cfg.weights_path(ii), n_joints, cfg.n_neurons)
                    .map(InitialTransform::from_checkpoint)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let seed = cfg.seed.unwrap_or_else(clock_seed);
        let mut rng = Prng::new(seed);
        let network = AdaptiveNetwork::build(robot, &cfg, initial, &mut rng)?;
        let uses_velocity = network.uses_velocity();
        let engine = start_engine(backend, network)?;

        info!(
            backend = %backend,
            joints = n_joints,
            populations = cfg.n_adapt_pop,
            neurons = cfg.n_neurons,
            mode = %cfg.unit_response_mode,
            seed,
            "dynamics adaptation ready"
        );

        Ok(Self {
            cfg,
            n_joints,
            uses_velocity,
            inputs: TickInputs::zeros(n_joints),
            engine,
            state: DriverState::Ready,
            calls: 0,
        })
    }

    pub fn config(&self) -> &AdaptationConfig {
        &self.cfg
    }

    pub fn backend(&self) -> ExecutionBackend {
        self.engine.backend()
    }

    pub fn n_joints(&self) -> usize {
        self.n_joints
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Feed one control tick and return the corrective output (one component
    /// per joint). `dq` is ignored unless velocity feedback is enabled.
    ///
    /// Synchronous backends advance exactly one `dt`; the free-running backend
    /// returns its most recent output, which may lag the inputs.
    pub fn generate(
        &mut self,
        q: &[f64],
        dq: &[f64],
        training_signal: &[f64],
    ) -> Result<&[f64], AdaptError> {
        if self.state == DriverState::Stopped {
            return Err(AdaptError::Stopped);
        }
        TickInputs::check(q, dq, training_signal, self.n_joints, self.uses_velocity)?;
        self.inputs.store(q, dq, training_signal);
        self.calls += 1;

        let calls = self.calls;
        self.engine.step(&self.inputs).map_err(|e| {
            error!(error = %e, call = calls, "adaptive step failed");
            e
        })
    }

    /// Copies of the current `(joints × neurons)` transforms, one per
    /// population.
    pub fn weights(&self) -> Vec<WeightMatrix> {
        self.engine.weights()
    }

    /// Append every population's transform to its configured weights file.
    /// Populations without a path are skipped. Returns how many were written.
    pub fn checkpoint(&self) -> Result<usize, AdaptError> {
        let mut written = 0;
        for (ii, w) in self.engine.weights().iter().enumerate() {
            let Some(path) = self.cfg.weights_path(ii) else {
                continue;
            };
            storage::append_snapshot(path, w).map_err(|source| AdaptError::Checkpoint {
                path: path.to_path_buf(),
                source,
            })?;
            written += 1;
        }
        info!(written, "checkpoint written");
        Ok(written)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            backend: self.engine.backend(),
            state: self.state,
            calls: self.calls,
            network: self.engine.diagnostics(),
        }
    }

    /// Shut the engine down. Terminal: later `generate` calls fail.
    pub fn stop(&mut self) {
        if self.state == DriverState::Stopped {
            return;
        }
        self.engine.stop();
        self.state = DriverState::Stopped;
        info!(calls = self.calls, "dynamics adaptation stopped");
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(10)
}
