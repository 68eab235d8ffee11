use std::fs::File;
use std::io::BufWriter;
use std::time::Instant;

use anyhow::{Context, Result};
use detnav::blueprint::build_detector;
use detnav::context::GeometryContext;
use detnav::navigator::{initial_states, Navigator};
use detnav::settings::{self};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use log::info;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, UnitSphere};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let settings = settings::load_config()?;
    info!("Settings:\n{}", settings);

    let gctx = GeometryContext::default();
    let detector = build_detector(&settings.detector, &gctx)?;

    let trajectories = &settings.trajectories;
    let mut rng = match trajectories.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let directions: Vec<Vector3<f64>> = (0..trajectories.count)
        .map(|_| Vector3::from(UnitSphere.sample(&mut rng)))
        .collect();
    let [x, y, z] = trajectories.origin;
    let states = initial_states(
        &Point3::new(x, y, z),
        &directions,
        trajectories.abs_momentum,
        trajectories.charge,
    );

    let pb = ProgressBar::new(states.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            concat!(
                "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} ",
                "{pos:>5}/{len:5} {msg} ETA: {eta_precise}",
            ),
        )?
        .progress_chars("█▇▆▅▄▃▂▁"),
    );
    pb.set_message("trajectory".to_string());

    let start = Instant::now();
    let navigator = Navigator::new(settings.navigation.max_steps);
    let traces = navigator.trace_all(&gctx, &detector, states, &pb);
    pb.finish();

    let duration = start.elapsed();
    info!(
        "Time taken: {:.2?}, Time per trajectory: {:.2?}",
        duration,
        duration / traces.len().max(1) as u32
    );
    let statuses = traces.iter().map(|t| t.status).counts();
    for (status, count) in statuses.into_iter().sorted_by_key(|(_, n)| *n) {
        info!("{:?}: {}", status, count);
    }
    let n = traces.len().max(1) as f64;
    let steps = traces.iter().map(|t| t.steps.len()).sum::<usize>();
    let crossings = traces.iter().map(|t| t.crossings().count()).sum::<usize>();
    info!(
        "Mean portal crossings: {:.3}, mean surface hits: {:.3}",
        crossings as f64 / n,
        (steps - crossings) as f64 / n
    );

    if let Some(output) = &trajectories.output {
        let file = File::create(output).with_context(|| format!("failed to create {}", output))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &traces)
            .context("failed to write traces")?;
        info!("Traces written to {}", output);
    }

    Ok(())
}
