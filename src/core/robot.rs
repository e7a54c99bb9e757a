//! Robot configuration collaborator.
//!
//! The adaptation module only needs the joint count and a way to normalize
//! joint angles and velocities into the populations' operating range.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub trait RobotConfig: Send {
    fn n_joints(&self) -> usize;

    /// Normalize wrapped joint angles into `out`.
    fn scaledown_q(&self, q: &[f64], out: &mut [f64]);

    /// Normalize joint velocities into `out`.
    fn scaledown_dq(&self, dq: &[f64], out: &mut [f64]);

    /// Reject inconsistent robot descriptions before anything is built.
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Per-joint affine scaling: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointScaling {
    pub q_means: Vec<f64>,
    pub q_scales: Vec<f64>,
    pub dq_means: Vec<f64>,
    pub dq_scales: Vec<f64>,
}

impl JointScaling {
    /// Default maximum joint speed (rad/s) mapped onto ±1.
    pub const DEFAULT_DQ_SCALE: f64 = 10.0;

    /// Angles in [−π, π) onto [−1, 1), velocities of ±10 rad/s onto ±1.
    pub fn symmetric(n_joints: usize) -> Self {
        Self {
            q_means: vec![0.0; n_joints],
            q_scales: vec![core::f64::consts::PI; n_joints],
            dq_means: vec![0.0; n_joints],
            dq_scales: vec![Self::DEFAULT_DQ_SCALE; n_joints],
        }
    }
}

impl RobotConfig for JointScaling {
    fn n_joints(&self) -> usize {
        self.q_means.len()
    }

    fn scaledown_q(&self, q: &[f64], out: &mut [f64]) {
        for (i, o) in out.iter_mut().enumerate() {
            *o = (q[i] - self.q_means[i]) / self.q_scales[i];
        }
    }

    fn scaledown_dq(&self, dq: &[f64], out: &mut [f64]) {
        for (i, o) in out.iter_mut().enumerate() {
            *o = (dq[i] - self.dq_means[i]) / self.dq_scales[i];
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let n = self.q_means.len();
        if n == 0 {
            return Err(ConfigError::invalid("robot", "at least one joint is required"));
        }
        if self.q_scales.len() != n || self.dq_means.len() != n || self.dq_scales.len() != n {
            return Err(ConfigError::invalid(
                "robot",
                "mean and scale vectors must all have one entry per joint",
            ));
        }
        if self
            .q_scales
            .iter()
            .chain(&self.dq_scales)
            .any(|s| !s.is_finite() || *s == 0.0)
        {
            return Err(ConfigError::invalid("robot", "scales must be finite and non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_scaling_maps_pi_to_one() {
        let s = JointScaling::symmetric(2);
        let mut out = [0.0; 2];
        s.scaledown_q(&[core::f64::consts::PI, -core::f64::consts::FRAC_PI_2], &mut out);
        assert!((out[0] - 1.0).abs() < 1e-12);
        assert!((out[1] + 0.5).abs() < 1e-12);
        s.scaledown_dq(&[5.0, -10.0], &mut out);
        assert_eq!(out, [0.5, -1.0]);
    }

    #[test]
    fn validate_catches_ragged_vectors() {
        let mut s = JointScaling::symmetric(3);
        assert!(s.validate().is_ok());
        s.dq_scales.pop();
        assert!(s.validate().is_err());
        let mut s = JointScaling::symmetric(1);
        s.q_scales[0] = 0.0;
        assert!(s.validate().is_err());
    }
}
