#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Headless command-line driver for Grainfield scenarios.

mod scenario;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use grainfield_core::{Command, Event, FieldId, GrainId, StepReport};
use grainfield_world::{self as world, query, Simulator};
use serde::Serialize;
use tracing::info;

use crate::scenario::Scenario;

/// Command-line arguments accepted by the driver.
#[derive(Debug, Parser)]
#[command(name = "grainfield", about = "Runs a Grainfield scenario without a user interface")]
struct CliArgs {
    /// Scenario file describing the grid, rules and initial layout.
    scenario: PathBuf,
    /// Number of steps to simulate.
    #[arg(long, default_value_t = 100)]
    steps: u32,
    /// Seed for the random source and for scattered placements.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Prints populations every N steps; zero disables progress output.
    #[arg(long, default_value_t = 0)]
    report_every: u32,
    /// Emits the final summary as JSON.
    #[arg(long)]
    json: bool,
}

/// Entry point for the Grainfield command-line interface.
fn main() -> Result<()> {
    init_tracing();
    let args = CliArgs::parse();

    let scenario = Scenario::load(&args.scenario, args.seed)?;
    let mut simulator = Simulator::seeded(
        &scenario.model,
        scenario.lattice,
        scenario.layout,
        args.seed,
    )
    .context("failed to construct simulator from scenario")?;
    info!(
        scenario = %args.scenario.display(),
        steps = args.steps,
        seed = args.seed,
        "running scenario"
    );

    let mut events = Vec::new();
    for _ in 0..args.steps {
        events.clear();
        world::apply(&mut simulator, Command::Step, &mut events);
        for event in &events {
            if let Event::StepCompleted { report } = event {
                if args.report_every > 0 && (report.step + 1) % u64::from(args.report_every) == 0
                {
                    print_progress(&simulator, report);
                }
            }
        }
    }

    let summary = RunSummary::capture(&simulator, args.seed);
    if args.json {
        let rendered =
            serde_json::to_string_pretty(&summary).context("failed to serialize run summary")?;
        println!("{rendered}");
    } else {
        summary.print();
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_progress(simulator: &Simulator, report: &StepReport) {
    let rules = query::rules(simulator);
    let populations = query::statistics(simulator)
        .latest_populations()
        .map(|(id, count)| {
            let name = rules.grain(id).map_or("", |grain| grain.name());
            format!("{}={count}", display_name(name, id))
        })
        .collect::<Vec<_>>()
        .join(" ");
    println!(
        "step {:>6}  deaths {:>5}  applied {:>5}  excluded {:>4}  {populations}",
        report.step + 1,
        report.deaths,
        report.applied,
        report.excluded
    );
}

fn display_name(name: &str, id: GrainId) -> String {
    if name.is_empty() {
        id.to_string()
    } else {
        name.to_owned()
    }
}

/// Final state of a run.
#[derive(Debug, Serialize)]
struct RunSummary {
    seed: u64,
    steps: u64,
    samples: usize,
    cells: usize,
    grains: Vec<GrainSummary>,
    fields: Vec<FieldSummary>,
    max_grain_count: u32,
    max_field_amount: f64,
    last_step: Option<StepReport>,
}

#[derive(Debug, Serialize)]
struct GrainSummary {
    id: GrainId,
    name: String,
    population: usize,
    peak: u32,
}

#[derive(Debug, Serialize)]
struct FieldSummary {
    id: FieldId,
    name: String,
    total: f64,
    peak: f64,
}

impl RunSummary {
    fn capture(simulator: &Simulator, seed: u64) -> Self {
        let rules = query::rules(simulator);
        let grains = rules
            .grains()
            .iter()
            .map(|grain| GrainSummary {
                id: grain.id(),
                name: grain.name().to_owned(),
                population: query::population(simulator, grain.id()),
                peak: query::grain_history(simulator, grain.id())
                    .and_then(|history| history.iter().copied().max())
                    .unwrap_or(0),
            })
            .collect();
        let statistics = query::statistics(simulator);
        let fields = statistics
            .latest_field_totals()
            .map(|(id, total)| FieldSummary {
                id,
                name: rules
                    .fields()
                    .iter()
                    .find(|field| field.id() == id)
                    .map_or_else(String::new, |field| field.name().to_owned()),
                total,
                peak: statistics
                    .field_history(id)
                    .map(|history| history.iter().copied().fold(0.0, f64::max))
                    .unwrap_or(0.0),
            })
            .collect();

        Self {
            seed,
            steps: query::step(simulator),
            samples: statistics.samples(),
            cells: query::lattice(simulator).data_size(),
            grains,
            fields,
            max_grain_count: query::max_grain_count(simulator),
            max_field_amount: query::max_field_amount(simulator),
            last_step: query::last_report(simulator).copied(),
        }
    }

    fn print(&self) {
        println!(
            "{} steps over {} cells (seed {}, {} samples)",
            self.steps, self.cells, self.seed, self.samples
        );
        for grain in &self.grains {
            println!(
                "  grain {:<16} population {:>7}  peak {:>7}",
                display_name(&grain.name, grain.id),
                grain.population,
                grain.peak
            );
        }
        for field in &self.fields {
            let label = if field.name.is_empty() {
                field.id.to_string()
            } else {
                field.name.clone()
            };
            println!(
                "  field {label:<16} total {:>12.4}  peak {:>12.4}",
                field.total, field.peak
            );
        }
        println!(
            "  maxima: population {}, field total {:.4}",
            self.max_grain_count, self.max_field_amount
        );
        if let Some(report) = &self.last_step {
            println!(
                "  last step: {} candidates, {} excluded, {} applied, {} deaths",
                report.candidates, report.excluded, report.applied, report.deaths
            );
        }
    }
}
