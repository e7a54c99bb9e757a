//! Two-joint arm under PD control with an unmodeled gravity load.
//!
//! The PD command is fed back as the training signal, so once adaptation has
//! learned the load the PD term (and the tracking error) shrink.

use tracing::info;

use dynadapt::prelude::*;

pub const DEMO_LEARNING_RATE: f64 = 5e-5;

const KP: f64 = 20.0;
const KV: f64 = 4.0;
const INERTIA: [f64; 2] = [0.6, 0.25];
const DAMPING: [f64; 2] = [0.3, 0.2];
const TARGETS: [[f64; 2]; 3] = [[0.8, -0.4], [-0.6, 1.0], [0.2, 0.5]];
const TARGET_PERIOD: usize = 2_000;
const REPORT_EVERY: usize = 1_000;

#[derive(Debug, Clone)]
pub struct DemoSettings {
    pub steps: usize,
    pub adapt: bool,
}

/// Torque the controller does not know about.
fn gravity_load(q: &[f64; 2]) -> [f64; 2] {
    [
        4.0 * q[0].cos() + 1.5 * (q[0] + q[1]).cos(),
        1.5 * (q[0] + q[1]).cos(),
    ]
}

pub fn run(cfg: AdaptationConfig, settings: &DemoSettings) -> Result<(), AdaptError> {
    let dt = cfg.dt;
    let mut adapt = if settings.adapt {
        Some(DynamicsAdaptation::new(
            Box::new(JointScaling::symmetric(2)),
            cfg,
        )?)
    } else {
        None
    };

    let mut q = [0.0f64; 2];
    let mut dq = [0.0f64; 2];
    let mut window_error = 0.0;

    for step in 0..settings.steps {
        let target = TARGETS[(step / TARGET_PERIOD) % TARGETS.len()];

        let mut u_pd = [0.0; 2];
        for j in 0..2 {
            u_pd[j] = KP * (target[j] - q[j]) - KV * dq[j];
        }
        let u_adapt = match adapt.as_mut() {
            Some(a) => {
                let out = a.generate(&q, &dq, &u_pd)?;
                [out[0], out[1]]
            }
            None => [0.0; 2],
        };

        let load = gravity_load(&q);
        for j in 0..2 {
            let u = u_pd[j] + u_adapt[j];
            let ddq = (u - DAMPING[j] * dq[j] - load[j]) / INERTIA[j];
            dq[j] += ddq * dt;
            q[j] += dq[j] * dt;
        }

        window_error += ((target[0] - q[0]).powi(2) + (target[1] - q[1]).powi(2)).sqrt();
        if (step + 1) % REPORT_EVERY == 0 {
            info!(
                step = step + 1,
                mean_error = window_error / REPORT_EVERY as f64,
                u_adapt = ?u_adapt,
                "arm tracking"
            );
            window_error = 0.0;
        }
    }

    if let Some(mut a) = adapt {
        let written = a.checkpoint()?;
        let diag = a.diagnostics();
        a.stop();
        match serde_json::to_string(&diag) {
            Ok(json) => println!("{json}"),
            Err(e) => info!(error = %e, "diagnostics not serializable"),
        }
        info!(written, "arm demo finished");
    }
    Ok(())
}
