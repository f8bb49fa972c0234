//! PS-AODV Simulator CLI
//!
//! Runs AODV and/or PS-AODV over synthetic scenarios or a recorded trace
//! and reports protocol and privacy metrics.

use anyhow::{bail, Context, Result};
use clap::Parser;
use psaodv_core::{DeliveryPolicy, PreventionModel, ProtocolConfig, Variant};
use psaodv_env::{EnvError, MobilitySource, TraceReplay};
use psaodv_sim::scenarios::ScenarioId;
use psaodv_sim::{RunExport, RunOutcome, RunnerConfig, SimContext, SimulationRunner, SyntheticTraffic};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// PS-AODV route discovery and eavesdropping simulator
#[derive(Parser, Debug)]
#[command(name = "psaodv-sim")]
#[command(about = "Compare AODV and PS-AODV against passive eavesdroppers", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (corridor, crossroads, convoy, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Protocol variant (aodv, psaodv, both)
    #[arg(short = 'V', long, default_value = "both")]
    variant: String,

    /// Moving vehicles per scenario (default depends on the scenario)
    #[arg(short = 'n', long)]
    vehicles: Option<usize>,

    /// Step cap (default: none for aodv, 5000 for psaodv)
    #[arg(short, long)]
    max_steps: Option<u64>,

    /// Replay a JSON-lines trace instead of synthetic traffic
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Per-step route request probability
    #[arg(long, default_value = "0.10")]
    p_req: f64,

    /// Per-step route reply probability
    #[arg(long, default_value = "0.05")]
    p_rep: f64,

    /// Steps between HELLO broadcasts
    #[arg(long, default_value = "10")]
    hello_interval: u64,

    /// Steps between pseudonym refreshes
    #[arg(long, default_value = "50")]
    refresh_interval: u64,

    /// Confirm route packets as delivered with this probability
    #[arg(long)]
    delivery_probability: Option<f64>,

    /// Count repeated sightings of the same pseudonym as linked
    #[arg(long)]
    strict_linkage: bool,

    /// Write the run reports to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// JSON output on stdout
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn variants(&self) -> Result<Vec<Variant>> {
        if self.variant.eq_ignore_ascii_case("both") {
            return Ok(Variant::all().to_vec());
        }
        let variant = self.variant.parse::<Variant>().map_err(anyhow::Error::msg)?;
        Ok(vec![variant])
    }

    fn scenarios(&self) -> Result<Vec<ScenarioId>> {
        if self.scenario.eq_ignore_ascii_case("all") {
            return Ok(ScenarioId::all());
        }
        let scenario = self
            .scenario
            .parse::<ScenarioId>()
            .map_err(anyhow::Error::msg)
            .context("Available scenarios: corridor, crossroads, convoy, all")?;
        Ok(vec![scenario])
    }

    fn protocol_config(&self, variant: Variant) -> ProtocolConfig {
        let delivery = match self.delivery_probability {
            Some(p) => DeliveryPolicy::Probability(p),
            None => DeliveryPolicy::Never,
        };
        let prevention = if self.strict_linkage {
            PreventionModel::RequireFreshPseudonym
        } else {
            PreventionModel::AssumeUnlinkable
        };

        ProtocolConfig::default()
            .with_variant(variant)
            .with_request_probability(self.p_req)
            .with_reply_probability(self.p_rep)
            .with_hello_interval(self.hello_interval)
            .with_refresh_interval(self.refresh_interval)
            .with_delivery(delivery)
            .with_prevention(prevention)
    }

    fn runner_config(&self, variant: Variant) -> RunnerConfig {
        let config = RunnerConfig::reference(variant);
        match self.max_steps {
            Some(max) => config.with_max_steps(Some(max)),
            None => config,
        }
    }
}

/// Runs one variant; the source is opened only once the config is valid.
fn run_variant<M, F>(
    args: &Args,
    seed: u64,
    variant: Variant,
    stop: &Arc<AtomicBool>,
    open: F,
) -> Result<RunOutcome>
where
    M: MobilitySource,
    F: FnOnce() -> Result<M, EnvError>,
{
    let mut runner = SimulationRunner::new(seed)
        .with_config(args.runner_config(variant))
        .with_stop_flag(Arc::clone(stop));

    runner
        .run_config(args.protocol_config(variant), open)
        .with_context(|| format!("{} run could not start", variant))
}

/// Runs every requested (source, variant) pair, pushing each finished
/// scenario into `exports` so an early error keeps what was collected.
fn collect_runs(
    args: &Args,
    seed: u64,
    variants: &[Variant],
    scenarios: &[ScenarioId],
    stop: &Arc<AtomicBool>,
    exports: &mut Vec<RunExport>,
) -> Result<()> {
    if let Some(trace) = &args.trace {
        let label = trace.display().to_string();
        exports.push(RunExport::new(&label, seed));

        for &variant in variants {
            let outcome = run_variant(args, seed, variant, stop, || TraceReplay::open(trace))?;
            if !args.json {
                log_outcome(&label, &outcome);
            }
            if let Some(export) = exports.last_mut() {
                export.add_run(&outcome);
            }
        }
        return Ok(());
    }

    let traffic_seed = SimContext::new(seed).traffic_seed();

    for scenario in scenarios {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let vehicles = args.vehicles.unwrap_or_else(|| scenario.default_vehicles());
        let traffic = scenario.traffic_config(vehicles);
        if !args.json {
            info!("Scenario {}: {}", scenario.name(), scenario.description());
        }

        exports.push(RunExport::new(scenario.name(), seed));
        for &variant in variants {
            // Every variant sees identical traffic
            let outcome = run_variant(args, seed, variant, stop, || {
                SyntheticTraffic::new(&traffic, traffic_seed)
            })?;
            if !args.json {
                log_outcome(scenario.name(), &outcome);
            }
            if let Some(export) = exports.last_mut() {
                export.add_run(&outcome);
            }
        }
    }

    Ok(())
}

fn log_outcome(label: &str, outcome: &RunOutcome) {
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("{} / {} ({:?})", label, outcome.report.variant, outcome.termination);
    for line in outcome.report.metrics.to_string().lines() {
        info!("  {}", line);
    }
}

fn log_comparison(export: &RunExport) {
    let (Some(plain), Some(pseudo)) = (
        export.metrics(Variant::Plain),
        export.metrics(Variant::Pseudonymous),
    ) else {
        return;
    };

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  COMPARISON ({})", export.scenario);
    info!(
        "    Eavesdropping attempts:  aodv={:<8} psaodv={}",
        plain.counters.eavesdropping_attempts, pseudo.counters.eavesdropping_attempts
    );
    info!(
        "    Packets intercepted:     aodv={:<8} psaodv={}",
        plain.counters.interceptions, pseudo.counters.interceptions
    );
    info!(
        "    Attempts prevented:      aodv={:<8} psaodv={}",
        plain.counters.eavesdropping_prevented, pseudo.counters.eavesdropping_prevented
    );
    info!(
        "    Linked observations:     aodv={:<8} psaodv={}",
        plain.counters.linked_observations, pseudo.counters.linked_observations
    );
    info!(
        "    Pseudonym refreshes:     aodv={:<8} psaodv={}",
        plain.counters.pseudonym_refreshes, pseudo.counters.pseudonym_refreshes
    );
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides --verbose
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let variants = args.variants()?;
    let scenarios = match &args.trace {
        Some(_) => Vec::new(),
        None => args.scenarios()?,
    };

    if !args.json {
        info!("PS-AODV Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("Seed: {} | Variants: {:?}", seed, variants);
    }

    // Reject bad settings before any mobility source is opened
    for &variant in &variants {
        args.protocol_config(variant)
            .validate()
            .with_context(|| format!("Invalid {} configuration", variant))?;
    }

    let mut exports: Vec<RunExport> = Vec::new();
    let collected = collect_runs(&args, seed, &variants, &scenarios, &stop, &mut exports);
    if let Err(e) = &collected {
        error!("Stopping early: {:#}", e);
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&exports).context("Failed to serialize results")?
        );
    } else {
        for export in &exports {
            log_comparison(export);
        }
    }

    if let Some(path) = &args.export {
        match exports.as_slice() {
            [single] => {
                single.write_to_file(path)?;
                info!("Exported results to {}", path.display());
            }
            _ => {
                // One file per scenario: <stem>_<scenario>.json
                for export in &exports {
                    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("psaodv");
                    let file = path.with_file_name(format!("{}_{}.json", stem, export.scenario));
                    export.write_to_file(&file)?;
                    info!("Exported {} to {}", export.scenario, file.display());
                }
            }
        }
    }

    let failures: Vec<String> = exports
        .iter()
        .flat_map(|export| {
            export
                .runs
                .iter()
                .filter(|run| run.termination.is_failure())
                .map(move |run| format!("{}/{}", export.scenario, run.variant))
        })
        .collect();

    if stop.load(Ordering::SeqCst) {
        warn!("Interrupted; reported results are partial");
    }
    collected?;
    if !failures.is_empty() {
        error!("Mobility source failed in: {}", failures.join(", "));
        bail!("{} run(s) ended with a mobility source failure", failures.len());
    }

    Ok(())
}
