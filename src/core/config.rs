//! Construction-time configuration for [`crate::adaptation::DynamicsAdaptation`].

use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::backend::ExecutionBackend;
use crate::ensemble::EncoderPlacement;
use crate::error::ConfigError;
use crate::intercepts::BaseDistribution;
use crate::neurons::{LifParams, ResponseMode};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AdaptationConfig {
    /// Units per adaptive population.
    pub n_neurons: usize,
    /// Number of adaptive populations; their outputs are summed.
    pub n_adapt_pop: usize,
    /// PES learning rate (κ).
    pub learning_rate: f64,
    /// Base intercept range `(low, high)` before the area transform. A base
    /// value `x < 0` leaves a unit active over `1 - |x|/2` of the input
    /// sphere, so the default `(-0.5, 0.0)` gives every unit 75-100% coverage.
    pub intercept_bounds: (f64, f64),
    /// When set, intercepts are drawn from a triangular base with this mode
    /// instead of a uniform one.
    pub intercept_mode: Option<f64>,
    pub unit_response_mode: ResponseMode,
    /// Clamp large training errors before they reach the learning rule.
    pub error_gating: bool,
    /// One checkpoint file per population. Missing entries, empty paths and
    /// nonexistent files all start from a zero transform.
    pub weights_paths: Vec<PathBuf>,
    /// `local-synchronous`, `accelerated-synchronous` or `distributed-async`.
    pub execution_backend: String,
    /// Feed joint velocities to the populations as well as angles.
    pub use_velocity: bool,

    /// Seed for every construction-time random draw. `None` seeds from the
    /// system clock.
    pub seed: Option<u64>,
    /// Simulation timestep (s).
    pub dt: f64,
    /// Maximum firing-rate range (Hz).
    pub max_rates: (f64, f64),
    /// Feedback → population synapse (s).
    pub input_synapse: f64,
    /// Population activity filter seen by the decoder and the learning rule (s).
    pub activity_synapse: f64,
    /// Training signal → learning rule synapse (s).
    pub error_synapse: f64,
    pub encoder_placement: EncoderPlacement,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            n_neurons: 1000,
            n_adapt_pop: 1,
            learning_rate: 1e-6,
            intercept_bounds: (-0.5, 0.0),
            intercept_mode: None,
            unit_response_mode: ResponseMode::ContinuousRate,
            error_gating: false,
            weights_paths: Vec::new(),
            execution_backend: ExecutionBackend::LocalSynchronous.to_string(),
            use_velocity: false,

            seed: Some(10),
            dt: 0.001,
            max_rates: (200.0, 400.0),
            input_synapse: 0.005,
            activity_synapse: 0.005,
            error_synapse: 0.01,
            encoder_placement: EncoderPlacement::Scattered,
        }
    }
}

impl AdaptationConfig {
    pub const MAX_NEURONS: usize = 1 << 20;

    pub fn with_neurons(mut self, n_neurons: usize) -> Self {
        self.n_neurons = n_neurons;
        self
    }

    pub fn with_populations(mut self, n_adapt_pop: usize) -> Self {
        self.n_adapt_pop = n_adapt_pop;
        self
    }

    pub fn with_learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    pub fn with_intercepts(mut self, low: f64, high: f64, mode: Option<f64>) -> Self {
        self.intercept_bounds = (low, high);
        self.intercept_mode = mode;
        self
    }

    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.unit_response_mode = mode;
        self
    }

    pub fn with_error_gating(mut self, enabled: bool) -> Self {
        self.error_gating = enabled;
        self
    }

    pub fn with_weights_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.weights_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.execution_backend = backend.into();
        self
    }

    pub fn with_velocity(mut self, enabled: bool) -> Self {
        self.use_velocity = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_encoder_placement(mut self, placement: EncoderPlacement) -> Self {
        self.encoder_placement = placement;
        self
    }

    /// Parsed backend name.
    pub fn backend(&self) -> Result<ExecutionBackend, ConfigError> {
        self.execution_backend.parse()
    }

    /// Base distribution fed to the area-intercept transform.
    pub fn intercept_base(&self) -> BaseDistribution {
        let (low, high) = self.intercept_bounds;
        match self.intercept_mode {
            Some(mode) => BaseDistribution::Triangular { low, mode, high },
            None => BaseDistribution::Uniform { low, high },
        }
    }

    /// Checkpoint path for population `index`, if one is configured.
    pub fn weights_path(&self, index: usize) -> Option<&Path> {
        self.weights_paths
            .get(index)
            .map(PathBuf::as_path)
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_neurons == 0 || self.n_neurons > Self::MAX_NEURONS {
            return Err(ConfigError::invalid(
                "n_neurons",
                format!("must be in [1, {}]", Self::MAX_NEURONS),
            ));
        }
        if self.n_adapt_pop == 0 {
            return Err(ConfigError::invalid("n_adapt_pop", "must be >= 1"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(ConfigError::invalid("learning_rate", "must be finite and >= 0"));
        }

        let (low, high) = self.intercept_bounds;
        if !(low < high) || low < -1.0 || high > 1.0 {
            return Err(ConfigError::invalid(
                "intercept_bounds",
                format!("need -1 <= low < high <= 1, got ({low}, {high})"),
            ));
        }
        self.intercept_base().validate()?;

        if self.weights_paths.len() > self.n_adapt_pop {
            return Err(ConfigError::invalid(
                "weights_paths",
                format!(
                    "{} paths given for {} populations",
                    self.weights_paths.len(),
                    self.n_adapt_pop
                ),
            ));
        }

        if !(self.dt > 0.0 && self.dt <= 0.1) {
            return Err(ConfigError::invalid("dt", "must be in (0, 0.1]"));
        }
        let (r_lo, r_hi) = self.max_rates;
        if !(r_lo > 0.0 && r_lo <= r_hi && r_hi.is_finite()) {
            return Err(ConfigError::invalid("max_rates", "need 0 < low <= high"));
        }
        let ceiling = LifParams::default().max_possible_rate();
        if r_hi >= ceiling {
            return Err(ConfigError::invalid(
                "max_rates",
                format!("high must be below the LIF ceiling of {ceiling} Hz, got {r_hi}"),
            ));
        }
        for (name, tau) in [
            ("input_synapse", self.input_synapse),
            ("activity_synapse", self.activity_synapse),
            ("error_synapse", self.error_synapse),
        ] {
            if !tau.is_finite() || tau < 0.0 {
                return Err(ConfigError::invalid(name, "must be finite and >= 0"));
            }
        }
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    #[cfg(feature = "serde")]
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = AdaptationConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.backend().unwrap(), ExecutionBackend::LocalSynchronous);
        assert_eq!(
            cfg.intercept_base(),
            BaseDistribution::Uniform { low: -0.5, high: 0.0 }
        );
    }

    #[test]
    fn rejects_inverted_or_out_of_range_intercepts() {
        let cfg = AdaptationConfig::default().with_intercepts(0.5, 0.2, None);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidParameter { name: "intercept_bounds", .. })
        ));
        let cfg = AdaptationConfig::default().with_intercepts(-1.5, 0.2, None);
        assert!(cfg.validate().is_err());
        let cfg = AdaptationConfig::default().with_intercepts(-0.5, 0.5, Some(0.8));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn max_rates_must_stay_below_refractory_ceiling() {
        let mut cfg = AdaptationConfig::default();
        cfg.max_rates = (450.0, 600.0);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidParameter { name: "max_rates", .. })
        ));
        cfg.max_rates = (200.0, 500.0);
        assert!(cfg.validate().is_err());
        cfg.max_rates = (200.0, 499.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_weight_path_counts_as_unset() {
        let cfg = AdaptationConfig::default()
            .with_populations(3)
            .with_weights_paths(["", "w1.dyn"]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.weights_path(0), None);
        assert_eq!(cfg.weights_path(1), Some(Path::new("w1.dyn")));
        assert_eq!(cfg.weights_path(2), None);
    }

    #[test]
    fn too_many_weight_paths_is_an_error() {
        let cfg = AdaptationConfig::default().with_weights_paths(["a", "b"]);
        assert!(cfg.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = AdaptationConfig::from_json_str(
            r#"{
                "n_neurons": 50,
                "execution_backend": "accelerated-synchronous",
                "unit_response_mode": "spiking",
                "intercept_bounds": [-0.9, 0.9],
                "intercept_mode": 0.2,
                "encoder_placement": "random"
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.n_neurons, 50);
        assert_eq!(cfg.unit_response_mode, ResponseMode::Spiking);
        assert_eq!(cfg.encoder_placement, EncoderPlacement::Random);
        assert_eq!(cfg.learning_rate, 1e-6);
        assert_eq!(
            cfg.intercept_base(),
            BaseDistribution::Triangular { low: -0.9, mode: 0.2, high: 0.9 }
        );
        assert!(AdaptationConfig::from_json_str("{ \"n_neurons\": -1 }").is_err());
    }
}
