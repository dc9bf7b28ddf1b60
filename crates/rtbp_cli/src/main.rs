use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use rtbp_core::{Axis, RunConfig, Section, Stability, TargetLine, TimeDirection};
use tracing::Level;
use tracing_subscriber::fmt::SubscriberBuilder;

mod commands;
mod io;

#[derive(Parser)]
#[command(name = "rtbp")]
#[command(about = "Poincaré sections, invariant manifolds and homoclinic points of the planar RTBP")]
#[command(long_about = "Reads the mass parameter from the first line of stdin, then one record \
per line; writes one record per line to stdout. Diagnostics go to stderr.")]
struct Cmd {
    /// JSON run configuration; missing fields keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Section overriding the configured one (e.g. y-descending, mean-anomaly-pi)
    #[arg(long, global = true, value_parser = parse_section)]
    section: Option<Section>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    action: Action,
}

#[derive(Clone, Copy, ValueEnum)]
enum StabilityArg {
    Unstable,
    Stable,
}

#[derive(Clone, Copy, ValueEnum)]
enum AxisArg {
    First,
    Second,
}

#[derive(Subcommand)]
enum Action {
    /// Advance records `x y px py` to a section crossing
    Section {
        #[arg(long, default_value_t = 1)]
        cuts: usize,
        /// Integrate backward in time
        #[arg(long)]
        inverse: bool,
    },
    /// Fixed point and eigen-data from records `energy u v`
    Eigen,
    /// Homoclinic point of the fixed point near each record `energy u v`
    Homoclinic {
        #[arg(long, value_enum, default_value_t = StabilityArg::Unstable)]
        stability: StabilityArg,
        /// Reduced coordinate fixed by the target line
        #[arg(long, value_enum, default_value_t = AxisArg::Second)]
        axis: AxisArg,
        /// Value of that coordinate on the target line
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        target: f64,
    },
}

fn parse_section(name: &str) -> Result<Section, String> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .map_err(|_| format!("unknown section {name:?}"))
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn main() -> Result<()> {
    let cmd = Cmd::parse();
    SubscriberBuilder::default()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_max_level(log_level(cmd.verbose))
        .init();

    let mut config: RunConfig = io::load_config(cmd.config.as_deref())?;
    if let Some(section) = cmd.section {
        config.section = section;
    }
    tracing::info!(section = config.section.name(), "run");

    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();
    match cmd.action {
        Action::Section { cuts, inverse } => {
            let direction = if inverse {
                TimeDirection::Backward
            } else {
                TimeDirection::Forward
            };
            commands::section(config, cuts, direction, stdin, stdout)?;
        }
        Action::Eigen => {
            commands::eigen(config, stdin, stdout)?;
        }
        Action::Homoclinic {
            stability,
            axis,
            target,
        } => {
            let stability = match stability {
                StabilityArg::Unstable => Stability::Unstable,
                StabilityArg::Stable => Stability::Stable,
            };
            let axis = match axis {
                AxisArg::First => Axis::First,
                AxisArg::Second => Axis::Second,
            };
            commands::homoclinic(config, stability, TargetLine::new(axis, target), stdin, stdout)?;
        }
    }
    Ok(())
}
