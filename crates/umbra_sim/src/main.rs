//! Umbra scenario runner
//!
//! Runs a lighting scenario headless and logs what the shadow scheduler did
//! each frame.
//!
//! Run with: cargo run -p umbra_sim -- scenarios/corridor.toml
//!       or: UMBRA_SCENARIO=scene.toml cargo run --bin umbra-sim
//!
//! Without a scenario file the built-in demo scene is used.

mod runner;
mod scenario;

use std::process::ExitCode;

use runner::Simulation;
use scenario::Scenario;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let scenario = load_scenario();
    log::info!(
        "Running {} frames with {} lights, {} events",
        scenario.frames,
        scenario.lights.len(),
        scenario.events.len()
    );

    let mut sim = match Simulation::new(scenario) {
        Ok(sim) => sim,
        Err(e) => {
            log::error!("Invalid lighting configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match sim.run() {
        Ok(summary) => {
            log::info!(
                "Done: {} frames, {} shadow maps rendered, {} allocation failures, \
                 {} frames within budget, max {} deferred, {} lights skipped by caps, \
                 {} commands, peak atlas coverage {:.1}%, {} lights left",
                summary.frames,
                summary.shadow_updates,
                summary.allocation_failures,
                summary.frames_within_budget,
                summary.max_deferred,
                summary.over_capacity_skips,
                summary.commands_encoded,
                summary.peak_coverage * 100.0,
                sim.manager().num_lights()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Simulation aborted at frame {}: {}", sim.summary().frames + 1, e);
            ExitCode::FAILURE
        }
    }
}

/// Scenario from the first positional argument, then `UMBRA_SCENARIO`,
/// falling back to the built-in demo
fn load_scenario() -> Scenario {
    let path = std::env::args()
        .skip(1)
        .find(|arg| !arg.starts_with("--"))
        .or_else(|| std::env::var("UMBRA_SCENARIO").ok());

    let Some(path) = path else {
        log::info!("No scenario given, using the built-in demo");
        return Scenario::demo();
    };

    match Scenario::load_from_file(&path) {
        Ok(scenario) => {
            log::info!("Loaded scenario from {}", path);
            scenario
        }
        Err(e) => {
            log::warn!("Failed to load scenario {}: {}, using the built-in demo", path, e);
            Scenario::demo()
        }
    }
}
