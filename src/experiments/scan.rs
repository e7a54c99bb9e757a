//! Intercept coverage report and the triangular intercept scan.

use std::fs;
use std::path::PathBuf;

use tracing::info;

use dynadapt::feedback::wrap_angle;
use dynadapt::intercepts::{covered_fraction, AreaIntercepts, BaseDistribution};
use dynadapt::prng::Prng;
use dynadapt::robot::{JointScaling, RobotConfig};
use dynadapt::tuning::{self, ScanSettings};

const COVERAGE_BINS: usize = 10;

/// Histogram of the covered fraction for raw uniform intercepts and for the
/// area-corrected ones. Flat rows are what the correction is for.
pub fn print_coverage(dims: usize, samples: usize) {
    let base = BaseDistribution::Uniform {
        low: -1.0,
        high: 1.0,
    };
    let dist = match AreaIntercepts::new(dims, base) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };
    let mut rng = Prng::new(10);
    let raw: Vec<f64> = (0..samples)
        .map(|_| covered_fraction(dims, rng.gen_range_f64(-1.0, 1.0)))
        .collect();
    let area: Vec<f64> = dist
        .sample(samples, &mut rng)
        .into_iter()
        .map(|c| covered_fraction(dims, c))
        .collect();

    println!("covered fraction histogram, d = {dims}, {samples} units");
    println!("{:>10} {:>8} {:>8}", "bin", "raw", "area");
    let raw_h = tuning::histogram_unit(&raw, COVERAGE_BINS + 1);
    let area_h = tuning::histogram_unit(&area, COVERAGE_BINS + 1);
    for (i, (r, a)) in raw_h.iter().zip(&area_h).enumerate() {
        let lo = i as f64 / COVERAGE_BINS as f64;
        let hi = (i + 1) as f64 / COVERAGE_BINS as f64;
        println!("{:>4.1}-{:<5.1} {:>8} {:>8}", lo, hi, r, a);
    }
}

#[derive(Debug, Clone)]
pub struct ScanArgs {
    pub dims: usize,
    pub n_neurons: usize,
    pub limit: Option<usize>,
    pub seed: u64,
    pub out: Option<PathBuf>,
}

/// Scaled feedback for a slow sweep through joint space.
fn sweep_inputs(dims: usize, samples: usize) -> Vec<Vec<f64>> {
    let robot = JointScaling::symmetric(dims);
    let mut q = vec![0.0; dims];
    (0..samples)
        .map(|i| {
            let t = i as f64 * 0.01;
            for (j, qj) in q.iter_mut().enumerate() {
                let f = 0.3 + 0.17 * j as f64;
                *qj = wrap_angle(2.5 * (f * t).sin() + 0.4 * (2.3 * f * t).cos());
            }
            let mut out = vec![0.0; robot.n_joints()];
            robot.scaledown_q(&q, &mut out);
            out
        })
        .collect()
}

pub fn run(args: &ScanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let inputs = sweep_inputs(args.dims, 2_000);
    let settings = ScanSettings {
        n_neurons: args.n_neurons,
        seed: args.seed,
        limit: args.limit,
        ..ScanSettings::default()
    };
    let results = tuning::scan(&inputs, &settings)?;

    for (rank, r) in results.iter().take(10).enumerate() {
        println!(
            "{:>2}: err {:>9.2}  bounds [{:+.1}, {:+.1}] mode {:+.1}  active {} / inactive {}",
            rank + 1,
            r.error,
            r.candidate.low,
            r.candidate.high,
            r.candidate.mode,
            r.num_active,
            r.num_inactive
        );
    }

    if let Some(path) = &args.out {
        fs::write(path, serde_json::to_string_pretty(&results)?)?;
        info!(path = %path.display(), results = results.len(), "scan results written");
    }
    Ok(())
}
