use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use log::info;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::blueprint::DetectorConfig;

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn default_config_parses() {
        let path = retrieve_project_root().unwrap().join("config/default.toml");
        let text = std::fs::read_to_string(path).unwrap();
        let settings: Settings = toml::from_str(&text).unwrap();
        validate_config(&settings).unwrap();
        assert_eq!(settings.detector.volumes.len(), 3);
        assert_eq!(settings.trajectories.origin, [50.0, 0.0, 0.0]);
    }

    #[test]
    fn load_default() {
        let settings = load_default_config().unwrap();
        assert!(settings.navigation.max_steps > 0);
    }

    #[test]
    fn cli_overrides() {
        let mut settings = load_default_config().unwrap();
        let args = CliArgs::parse_from(["detnav", "-n", "7", "--seed", "3", "--max-steps", "12"]);
        apply_overrides(&mut settings, &args);
        assert_eq!(settings.trajectories.count, 7);
        assert_eq!(settings.trajectories.seed, Some(3));
        assert_eq!(settings.navigation.max_steps, 12);
    }

    #[test]
    fn invalid_values_rejected() {
        let mut settings = load_default_config().unwrap();
        settings.trajectories.abs_momentum = -1.0;
        assert!(validate_config(&settings).is_err());
    }
}

/// Distance below which an intersection is taken to be the current position.
pub const ON_SURFACE_TOLERANCE: f64 = 1e-4;
/// Maximum deviation for two surfaces to be considered identical.
pub const SURFACE_MATCH_TOLERANCE: f64 = 1e-6;
/// Tolerance for points on a boundary to count as inside.
pub const BOUNDARY_TOLERANCE: f64 = 1e-6;
/// Number of segments used to sample curved boundaries.
pub const DEFAULT_POLYHEDRON_SEGMENTS: usize = 16;

/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub detector: DetectorConfig,
    pub navigation: NavigationSettings,
    pub trajectories: TrajectorySettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NavigationSettings {
    pub max_steps: usize, // portal crossings before a trajectory is abandoned
}

/// Straight-line trajectories shot from a common origin.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TrajectorySettings {
    pub count: usize,
    pub origin: [f64; 3],
    #[serde(default = "default_abs_momentum")]
    pub abs_momentum: f64,
    #[serde(default = "default_charge")]
    pub charge: f64,
    pub seed: Option<u64>,
    pub output: Option<String>, // json file for the traces
}

fn default_abs_momentum() -> f64 {
    1.0
}

fn default_charge() -> f64 {
    -1.0
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings: Config = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("failed to load the default configuration")?;

    let config: Settings = settings
        .try_deserialize()
        .context("failed to deserialize the default configuration")?;

    validate_config(&config)?;

    Ok(config)
}

/// Load `config/local.toml` (or `config/default.toml`), then `DETNAV_*`
/// environment variables, then command-line overrides.
pub fn load_config() -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    let config_file = if local_config.exists() {
        info!("Using local configuration: {:?}", local_config);
        local_config
    } else {
        info!("Using default configuration: {:?}", default_config_file);
        default_config_file
    };

    let settings: Config = Config::builder()
        .add_source(File::from(config_file).required(true))
        .add_source(Environment::with_prefix("detnav").separator("__").try_parsing(true))
        .build()
        .context("failed to load configuration")?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("failed to deserialize configuration")?;

    let args = CliArgs::parse();
    apply_overrides(&mut config, &args);

    validate_config(&config)?;

    Ok(config)
}

fn apply_overrides(config: &mut Settings, args: &CliArgs) {
    if let Some(count) = args.count {
        config.trajectories.count = count;
    }
    if let Some(max_steps) = args.max_steps {
        config.navigation.max_steps = max_steps;
    }
    if let Some(origin) = &args.origin {
        if let [x, y, z] = origin.as_slice() {
            config.trajectories.origin = [*x, *y, *z];
        }
    }
    if let Some(p) = args.momentum {
        config.trajectories.abs_momentum = p;
    }
    if let Some(q) = args.charge {
        config.trajectories.charge = q;
    }
    if args.seed.is_some() {
        config.trajectories.seed = args.seed;
    }
    if args.output.is_some() {
        config.trajectories.output = args.output.clone();
    }
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the DETNAV_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its
///    parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("DETNAV_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }
    let exe_path = env::current_exe().context("failed to get current executable path")?;
    let mut current_dir = exe_path.parent().map(PathBuf::from);
    while let Some(dir) = current_dir {
        if dir.join("config").is_dir() {
            return Ok(dir);
        }
        current_dir = dir.parent().map(PathBuf::from);
    }
    bail!("could not find the project root directory")
}

fn validate_config(config: &Settings) -> Result<()> {
    ensure!(!config.detector.volumes.is_empty(), "detector must contain at least one volume");
    ensure!(config.navigation.max_steps > 0, "max_steps must be greater than 0");
    ensure!(
        config.trajectories.abs_momentum > 0.0,
        "absolute momentum must be greater than 0"
    );
    ensure!(
        config.trajectories.origin.iter().all(|c| c.is_finite()),
        "trajectory origin must be finite"
    );
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "detnav - detector volume construction and straight-line navigation")]
pub struct CliArgs {
    /// Number of trajectories to trace.
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Maximum number of portal crossings per trajectory.
    #[arg(long)]
    max_steps: Option<usize>,

    /// Common origin of all trajectories, as three values separated by spaces.
    #[arg(long, value_parser, num_args = 3, value_delimiter = ' ')]
    origin: Option<Vec<f64>>,

    /// Absolute momentum carried by the navigation state.
    #[arg(short, long)]
    momentum: Option<f64>,

    /// Charge carried by the navigation state.
    #[arg(short, long, allow_hyphen_values = true)]
    charge: Option<f64>,

    /// Random seed for the trajectory directions.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Write the traces as json to this file.
    #[arg(short, long)]
    output: Option<String>,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Detector: {} ({} volumes)", self.detector.name, self.detector.volumes.len())?;
        for volume in &self.detector.volumes {
            writeln!(f, "  {}: {}", volume.name, volume.bounds_type)?;
        }
        writeln!(f, "Max steps: {}", self.navigation.max_steps)?;
        writeln!(f, "Trajectories: {}", self.trajectories.count)?;
        writeln!(f, "  Origin: {:?}", self.trajectories.origin)?;
        writeln!(
            f,
            "  Momentum: {}, charge: {}",
            self.trajectories.abs_momentum, self.trajectories.charge
        )?;
        match self.trajectories.seed {
            Some(seed) => writeln!(f, "  Seed: {}", seed)?,
            None => writeln!(f, "  Seed: random")?,
        }
        if let Some(output) = &self.trajectories.output {
            writeln!(f, "  Output: {}", output)?;
        }
        Ok(())
    }
}
