//! Joint-state feedback encoding.

use crate::robot::RobotConfig;

/// Read-only joint snapshot for one control tick.
#[derive(Debug, Clone, Copy)]
pub struct JointState<'a> {
    /// Joint angles (rad).
    pub q: &'a [f64],
    /// Joint velocities (rad/s).
    pub dq: &'a [f64],
}

/// Wrap an angle with floored modulo: `((q + π) mod 2π) − π`.
#[inline]
pub fn wrap_angle(q: f64) -> f64 {
    use core::f64::consts::PI;
    (q + PI).rem_euclid(2.0 * PI) - PI
}

/// Maps `(q, dq)` to the scaled vector that drives every population.
#[derive(Debug, Clone)]
pub struct FeedbackEncoder {
    n_joints: usize,
    use_velocity: bool,
    wrapped: Vec<f64>,
}

impl FeedbackEncoder {
    pub fn new(n_joints: usize, use_velocity: bool) -> Self {
        Self {
            n_joints,
            use_velocity,
            wrapped: vec![0.0; n_joints],
        }
    }

    pub fn inputs_per_joint(&self) -> usize {
        if self.use_velocity {
            2
        } else {
            1
        }
    }

    /// Output length: `joints × inputs_per_joint`.
    pub fn dimensions(&self) -> usize {
        self.n_joints * self.inputs_per_joint()
    }

    /// Encode one tick into `out` (length [`Self::dimensions`]).
    pub fn encode(&mut self, robot: &dyn RobotConfig, state: JointState<'_>, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.dimensions());
        let n = self.n_joints;
        for (w, &q) in self.wrapped.iter_mut().zip(state.q) {
            *w = wrap_angle(q);
        }
        robot.scaledown_q(&self.wrapped, &mut out[..n]);
        if self.use_velocity {
            robot.scaledown_dq(state.dq, &mut out[n..2 * n]);
        }
    }
}
