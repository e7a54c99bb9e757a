//! # dynadapt
//!
//! Adaptive dynamics compensation for robot-arm control.
//!
//! A population of leaky integrate-and-fire units is driven by scaled joint
//! feedback, and its output transform is adapted online with the PES rule so
//! that the emitted correction cancels unmodeled dynamics (friction, unknown
//! loads, miscalibration). The controller feeds its own control error back
//! as the training signal every tick.
//!
//! ## Quick Start
//!
//! ```
//! use dynadapt::prelude::*;
//!
//! let cfg = AdaptationConfig::default()
//!     .with_neurons(100)
//!     .with_learning_rate(1e-5);
//! let mut adapt = DynamicsAdaptation::new(Box::new(JointScaling::symmetric(3)), cfg)?;
//!
//! let q = [0.3, -1.1, 0.4];
//! let u_adapt = adapt.generate(&q, &[0.0; 3], &[0.1, 0.0, -0.2])?;
//! assert_eq!(u_adapt.len(), 3);
//! adapt.stop();
//! # Ok::<(), AdaptError>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): JSON configuration and serializable reports
//! - `scattered` (default): low-discrepancy encoder placement
//! - `background` (default): the free-running `distributed-async` backend
//! - `parallel`: the `accelerated-synchronous` backend, via rayon
//! - `simd`: vectorized inner loops via the `wide` crate
//!
//! ## Modules
//!
//! - [`adaptation`]: the driver consumed by a controller
//! - [`network`], [`backend`]: per-step network and execution engines
//! - [`ensemble`], [`neurons`], [`intercepts`]: population construction
//! - [`learning`]: PES with optional error gating
//! - [`storage`]: weight checkpoint files
//! - [`tuning`]: offline intercept distribution search

#[path = "core/adaptation.rs"]
pub mod adaptation;

#[path = "core/backend.rs"]
pub mod backend;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/ensemble.rs"]
pub mod ensemble;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/feedback.rs"]
pub mod feedback;

#[path = "core/intercepts.rs"]
pub mod intercepts;

#[path = "core/kernels.rs"]
pub mod kernels;

#[path = "core/learning.rs"]
pub mod learning;

#[path = "core/network.rs"]
pub mod network;

#[path = "core/neurons.rs"]
pub mod neurons;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/robot.rs"]
pub mod robot;

#[path = "core/storage.rs"]
pub mod storage;

#[path = "core/synapse.rs"]
pub mod synapse;

#[path = "core/tuning.rs"]
pub mod tuning;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::adaptation::{Diagnostics, DriverState, DynamicsAdaptation};
    pub use crate::backend::ExecutionBackend;
    pub use crate::config::AdaptationConfig;
    pub use crate::ensemble::EncoderPlacement;
    pub use crate::error::{AdaptError, ConfigError};
    pub use crate::intercepts::{AreaIntercepts, BaseDistribution};
    pub use crate::neurons::ResponseMode;
    pub use crate::robot::{JointScaling, RobotConfig};
    pub use crate::storage::WeightMatrix;
}
