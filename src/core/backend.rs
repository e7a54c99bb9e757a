//! Execution backends.
//!
//! A backend is chosen once at construction and wraps the network in an
//! [`Engine`]:
//! - `local-synchronous`: one scalar step per `generate` call.
//! - `accelerated-synchronous`: one step per call, spread over rayon
//!   (requires the `parallel` feature).
//! - `distributed-async`: the network free-runs on its own thread paced at
//!   `dt`; `generate` pushes inputs and reads back the latest output
//!   (requires the `background` feature).

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "background")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "background")]
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
#[cfg(feature = "background")]
use std::thread::{self, JoinHandle};
#[cfg(feature = "background")]
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "background")]
use tracing::{debug, error};
use tracing::info;

use crate::error::{AdaptError, ConfigError};
use crate::network::{AdaptiveNetwork, ExecutionTier, NetworkDiagnostics, TickInputs};
use crate::storage::WeightMatrix;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ExecutionBackend {
    #[default]
    LocalSynchronous,
    AcceleratedSynchronous,
    DistributedAsync,
}

impl ExecutionBackend {
    pub const ALL: [ExecutionBackend; 3] = [
        Self::LocalSynchronous,
        Self::AcceleratedSynchronous,
        Self::DistributedAsync,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::LocalSynchronous => "local-synchronous",
            Self::AcceleratedSynchronous => "accelerated-synchronous",
            Self::DistributedAsync => "distributed-async",
        }
    }

    /// Whether this build can run the backend.
    pub fn ensure_available(self) -> Result<(), ConfigError> {
        match self {
            Self::LocalSynchronous => Ok(()),
            Self::AcceleratedSynchronous => {
                if cfg!(feature = "parallel") {
                    Ok(())
                } else {
                    Err(ConfigError::BackendUnavailable {
                        backend: self,
                        reason: "built without the `parallel` feature",
                    })
                }
            }
            Self::DistributedAsync => {
                if cfg!(feature = "background") {
                    Ok(())
                } else {
                    Err(ConfigError::BackendUnavailable {
                        backend: self,
                        reason: "built without the `background` feature",
                    })
                }
            }
        }
    }

    pub fn is_synchronous(self) -> bool {
        !matches!(self, Self::DistributedAsync)
    }

    fn tier(self) -> ExecutionTier {
        match self {
            Self::AcceleratedSynchronous => ExecutionTier::Parallel,
            Self::LocalSynchronous | Self::DistributedAsync => ExecutionTier::Scalar,
        }
    }
}

impl fmt::Display for ExecutionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExecutionBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|b| b.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownBackend(s.to_string()))
    }
}

/// Steps the network on behalf of the driver.
pub trait Engine: Send {
    fn backend(&self) -> ExecutionBackend;

    /// Hand over this tick's inputs and return the most recent output.
    /// Synchronous engines compute the step inline.
    fn step(&mut self, inputs: &TickInputs) -> Result<&[f64], AdaptError>;

    fn weights(&self) -> Vec<WeightMatrix>;

    fn diagnostics(&self) -> NetworkDiagnostics;

    /// Release engine resources. Idempotent.
    fn stop(&mut self);
}

/// Wrap `network` in the engine for `backend`. Availability must already
/// have been checked; this only fails if a thread cannot be spawned.
pub fn start_engine(
    backend: ExecutionBackend,
    network: AdaptiveNetwork,
) -> Result<Box<dyn Engine>, ConfigError> {
    backend.ensure_available()?;
    info!(backend = %backend, "starting adaptive engine");
    match backend {
        ExecutionBackend::LocalSynchronous | ExecutionBackend::AcceleratedSynchronous => {
            Ok(Box::new(SyncEngine::new(backend, network)))
        }
        #[cfg(feature = "background")]
        ExecutionBackend::DistributedAsync => {
            Ok(Box::new(FreeRunningEngine::start(network)?))
        }
        #[cfg(not(feature = "background"))]
        ExecutionBackend::DistributedAsync => Err(ConfigError::BackendUnavailable {
            backend,
            reason: "built without the `background` feature",
        }),
    }
}

// =========================================================================
// Synchronous
// =========================================================================

#[derive(Debug)]
pub struct SyncEngine {
    backend: ExecutionBackend,
    tier: ExecutionTier,
    network: AdaptiveNetwork,
}

impl SyncEngine {
    pub fn new(backend: ExecutionBackend, network: AdaptiveNetwork) -> Self {
        Self {
            backend,
            tier: backend.tier().effective(),
            network,
        }
    }

    pub fn network(&self) -> &AdaptiveNetwork {
        &self.network
    }
}

impl Engine for SyncEngine {
    fn backend(&self) -> ExecutionBackend {
        self.backend
    }

    fn step(&mut self, inputs: &TickInputs) -> Result<&[f64], AdaptError> {
        self.network.step(inputs, self.tier)
    }

    fn weights(&self) -> Vec<WeightMatrix> {
        self.network.weights()
    }

    fn diagnostics(&self) -> NetworkDiagnostics {
        self.network.diagnostics()
    }

    fn stop(&mut self) {}
}

// =========================================================================
// Free-running
// =========================================================================

#[cfg(feature = "background")]
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(feature = "background")]
#[derive(Debug)]
struct Shared {
    inputs: Mutex<TickInputs>,
    output: Mutex<Vec<f64>>,
    failure: Mutex<Option<String>>,
    running: AtomicBool,
}

/// Runs the network on a dedicated thread paced at `dt`.
#[cfg(feature = "background")]
#[derive(Debug)]
pub struct FreeRunningEngine {
    shared: Arc<Shared>,
    network: Arc<Mutex<AdaptiveNetwork>>,
    handle: Option<JoinHandle<()>>,
    latest: Vec<f64>,
}

#[cfg(feature = "background")]
impl FreeRunningEngine {
    pub fn start(network: AdaptiveNetwork) -> Result<Self, ConfigError> {
        let n_joints = network.n_joints();
        let period = Duration::from_secs_f64(network.dt());
        let shared = Arc::new(Shared {
            inputs: Mutex::new(TickInputs::zeros(n_joints)),
            output: Mutex::new(vec![0.0; n_joints]),
            failure: Mutex::new(None),
            running: AtomicBool::new(true),
        });
        let network = Arc::new(Mutex::new(network));

        let handle = {
            let shared = Arc::clone(&shared);
            let network = Arc::clone(&network);
            thread::Builder::new()
                .name("dynadapt-engine".to_string())
                .spawn(move || run_free(&shared, &network, period))
                .map_err(ConfigError::EngineStart)?
        };

        Ok(Self {
            shared,
            network,
            handle: Some(handle),
            latest: vec![0.0; n_joints],
        })
    }

    fn check_alive(&self) -> Result<(), AdaptError> {
        if let Some(msg) = lock(&self.shared.failure).clone() {
            return Err(AdaptError::RuntimeStep(msg));
        }
        let exited = self.handle.as_ref().map_or(true, |h| h.is_finished());
        if exited {
            return Err(AdaptError::RuntimeStep(
                "background engine thread exited".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "background")]
fn run_free(shared: &Shared, network: &Mutex<AdaptiveNetwork>, period: Duration) {
    let mut inputs = TickInputs::default();
    let mut next = Instant::now();
    while shared.running.load(Ordering::Acquire) {
        inputs.clone_from(&lock(&shared.inputs));

        let result = {
            let mut net = lock(network);
            net.step(&inputs, ExecutionTier::Scalar)
                .map(|out| lock(&shared.output).copy_from_slice(out))
        };
        if let Err(e) = result {
            error!(error = %e, "background engine stopped");
            *lock(&shared.failure) = Some(e.to_string());
            shared.running.store(false, Ordering::Release);
            break;
        }

        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            // Fell behind; do not try to catch up with a burst of steps.
            next = now;
        }
    }
    debug!("background engine loop exited");
}

#[cfg(feature = "background")]
impl Engine for FreeRunningEngine {
    fn backend(&self) -> ExecutionBackend {
        ExecutionBackend::DistributedAsync
    }

    fn step(&mut self, inputs: &TickInputs) -> Result<&[f64], AdaptError> {
        self.check_alive()?;
        lock(&self.shared.inputs).clone_from(inputs);
        self.latest.copy_from_slice(&lock(&self.shared.output));
        Ok(&self.latest)
    }

    fn weights(&self) -> Vec<WeightMatrix> {
        lock(&self.network).weights()
    }

    fn diagnostics(&self) -> NetworkDiagnostics {
        lock(&self.network).diagnostics()
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("background engine thread panicked");
            }
        }
    }
}

#[cfg(feature = "background")]
impl Drop for FreeRunningEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_and_rejects_others() {
        for b in ExecutionBackend::ALL {
            assert_eq!(b.name().parse::<ExecutionBackend>().unwrap(), b);
            assert_eq!(b.to_string(), b.name());
        }
        assert_eq!(
            " Local-Synchronous ".parse::<ExecutionBackend>().unwrap(),
            ExecutionBackend::LocalSynchronous
        );
        match "nengo_spinnaker".parse::<ExecutionBackend>() {
            Err(ConfigError::UnknownBackend(name)) => assert_eq!(name, "nengo_spinnaker"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn local_backend_is_always_available() {
        assert!(ExecutionBackend::LocalSynchronous.ensure_available().is_ok());
    }

    #[cfg(not(feature = "parallel"))]
    #[test]
    fn accelerated_backend_needs_parallel_feature() {
        assert!(matches!(
            ExecutionBackend::AcceleratedSynchronous.ensure_available(),
            Err(ConfigError::BackendUnavailable { .. })
        ));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn accelerated_backend_available_with_parallel_feature() {
        assert!(ExecutionBackend::AcceleratedSynchronous.ensure_available().is_ok());
    }

    #[cfg(not(feature = "background"))]
    #[test]
    fn async_backend_needs_background_feature() {
        assert!(ExecutionBackend::DistributedAsync.ensure_available().is_err());
    }
}
