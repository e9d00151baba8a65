//! # Constant-current discharge
//!
//! Builds a lithium-ion or lead-acid template, discharges it at 1 A until the
//! lower voltage cut-off, rests it, and prints the terminal voltage every few
//! minutes of simulated time.
//!
//! ## Running the Example
//!
//! ```sh
//! cargo run --example discharge -- lithium_ion
//! cargo run --example discharge -- lead_acid path/to/simulation.toml
//! ```
//!
//! Set `RUST_LOG=debug` to follow the solver step by step.

use std::error::Error;

use tracing_subscriber::EnvFilter;
use volta_model::{
    Pipeline, Simulation, SimulationConfig,
    chemistry::Chemistry,
    experiment::{Experiment, VOLTAGE_OUTPUT},
};
use volta_observers::ProgressLog;
use volta_symbolic::Inputs;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (chemistry, cut_off) = match args.next().as_deref() {
        None | Some("lithium_ion") => (Chemistry::LithiumIon, "3.2 V"),
        Some("lead_acid") => (Chemistry::LeadAcid, "2.0 V"),
        Some(other) => return Err(format!("unknown chemistry `{other}`").into()),
    };
    let config = match args.next() {
        Some(path) => SimulationConfig::from_path(path)?,
        None => SimulationConfig::default(),
    };

    let descriptor = chemistry.descriptor();
    let model = descriptor.build(&mut Pipeline::new(), &descriptor.parameters(), &config)?;
    println!("{chemistry}: {} states", model.state_len());

    let discharge = format!("Discharge at 1 A until {cut_off}");
    let experiment = Experiment::new([[discharge.as_str(), "Rest for 30 minutes"]])?
        .with_period("5 minutes")?;

    let mut progress = ProgressLog::new(chemistry.to_string(), 50);
    let solution = Simulation::from_config(model, &config)?.run_experiment_observed(
        &experiment,
        &Inputs::new(),
        &mut progress,
    )?;

    for step in solution.steps() {
        println!("\n{}", step.step());
        let voltage = step.solution().scalar_output(VOLTAGE_OUTPUT)?;
        let mut next = f64::NEG_INFINITY;
        for (t, v) in step.solution().times().iter().zip(voltage) {
            if *t >= next {
                println!("  t = {:>7.1} min  V = {v:.4}", t / 60.0);
                next = t + 300.0;
            }
        }
    }

    println!(
        "\n{:?} after {} solver events, {:.3} A.h discharged",
        solution.termination(),
        progress.seen(),
        solution.cycle_capacities().iter().sum::<f64>()
    );
    Ok(())
}
