//! Demo driver for the adaptation module.
//!
//! Examples:
//!   dynadapt arm-demo --steps 20000
//!   dynadapt arm-demo --config adapt.json --weights arm.dyn
//!   dynadapt intercepts --dims 6
//!   dynadapt scan --dims 2 --neurons 500 --limit 50 --out scan.json
//!
//! `DYNADAPT_BACKEND` overrides the configured execution backend
//! (local-synchronous | accelerated-synchronous | distributed-async).

use std::path::PathBuf;
use std::process;

use tracing::{error, info};

#[path = "experiments/arm.rs"]
mod arm;
#[path = "experiments/scan.rs"]
mod scan;

use dynadapt::prelude::*;

fn usage() -> ! {
    eprintln!("dynadapt (adaptive dynamics compensation demos)");
    eprintln!("Usage: dynadapt <command> [options]\n");
    eprintln!("Commands:");
    eprintln!("  arm-demo    Two-link arm with an unmodeled load, PD + adaptation");
    eprintln!("      --steps N        control ticks to simulate (default 10000)");
    eprintln!("      --config PATH    JSON AdaptationConfig");
    eprintln!("      --weights PATH   checkpoint to load and append to");
    eprintln!("      --no-adapt       run the PD controller alone");
    eprintln!("  intercepts  Compare raw and area-corrected intercept coverage");
    eprintln!("      --dims D         input dimensionality (default 4)");
    eprintln!("      --samples N      intercepts to draw (default 2000)");
    eprintln!("  scan        Search triangular intercept distributions");
    eprintln!("      --dims D --neurons N --limit K --seed S --out PATH");
    process::exit(1);
}

/// Value following `--name`, if present.
fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], name: &str, default: T) -> T {
    match flag_value(args, name) {
        None => default,
        Some(v) => v.parse().unwrap_or_else(|_| {
            eprintln!("invalid value for {name}: {v}");
            usage();
        }),
    }
}

fn load_config(args: &[String]) -> Result<AdaptationConfig, ConfigError> {
    let mut cfg = match flag_value(args, "--config") {
        Some(path) => AdaptationConfig::from_json_file(&PathBuf::from(path))?,
        None => AdaptationConfig::default().with_learning_rate(arm::DEMO_LEARNING_RATE),
    };
    if let Some(path) = flag_value(args, "--weights") {
        cfg.weights_paths = vec![PathBuf::from(path)];
    }
    if let Ok(v) = std::env::var("DYNADAPT_BACKEND") {
        info!("Backend requested via DYNADAPT_BACKEND: {}", v);
        cfg.execution_backend = v;
    }
    Ok(cfg)
}

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(cmd) = args.first().map(String::as_str) else {
        usage();
    };
    let rest = &args[1..];

    let result: Result<(), Box<dyn std::error::Error>> = match cmd {
        "--help" | "-h" | "help" => usage(),
        "arm-demo" => load_config(rest).map_err(Into::into).and_then(|cfg| {
            let settings = arm::DemoSettings {
                steps: parse_flag(rest, "--steps", 10_000),
                adapt: !rest.iter().any(|a| a == "--no-adapt"),
            };
            arm::run(cfg, &settings).map_err(Into::into)
        }),
        "intercepts" => {
            scan::print_coverage(
                parse_flag(rest, "--dims", 4),
                parse_flag(rest, "--samples", 2000),
            );
            Ok(())
        }
        "scan" => scan::run(&scan::ScanArgs {
            dims: parse_flag(rest, "--dims", 2),
            n_neurons: parse_flag(rest, "--neurons", 1000),
            limit: flag_value(rest, "--limit").and_then(|v| v.parse().ok()),
            seed: parse_flag(rest, "--seed", 10),
            out: flag_value(rest, "--out").map(PathBuf::from),
        }),
        other => {
            eprintln!("Unknown command: {other}");
            usage();
        }
    };

    if let Err(e) = result {
        error!("{e}");
        process::exit(2);
    }
}
