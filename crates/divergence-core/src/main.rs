use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use divergence_core::simulator::{run_simulator, SimulatorConfig};
use divergence_core::telemetry::init_tracing;
use divergence_core::{EngineConfig, InMemoryCollaborator, MindMapEngine, ViewMode};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("divergence-sim")
        .version(divergence_core::VERSION)
        .about("Creative divergence graph engine driver")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("Path to an engine config TOML file"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Run randomized sessions against an in-memory server")
                .arg(
                    Arg::new("operations")
                        .long("ops")
                        .default_value("1000")
                        .value_parser(value_parser!(u64))
                        .help("Number of operations to simulate"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("failure-rate")
                        .long("failure-rate")
                        .default_value("0.1")
                        .value_parser(value_parser!(f64))
                        .help("Probability that a remote call fails"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop simulation on first violation"),
                ),
        )
        .subcommand(
            Command::new("demo")
                .about("Open a topic, diverge twice and print a view as JSON")
                .arg(
                    Arg::new("topic")
                        .long("topic")
                        .default_value("Chairs")
                        .help("Topic title for the root node"),
                )
                .arg(
                    Arg::new("view")
                        .long("view")
                        .default_value("all")
                        .value_parser(["all", "marked", "ai", "manual"])
                        .help("View mode to print"),
                ),
        );

    let matches = cli.get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => EngineConfig::default(),
    };
    init_tracing(&config)?;

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let total_operations = args.get_one::<u64>("operations").copied().unwrap_or(1_000);
            let seed = args.get_one::<u64>("seed").copied().unwrap_or(42);
            let failure_rate = args.get_one::<f64>("failure-rate").copied().unwrap_or(0.1);

            println!("Running divergence simulator...");
            println!("Operations: {total_operations}");
            println!("Seed: {seed}");
            println!();

            let report = run_simulator(SimulatorConfig {
                seed,
                total_operations,
                failure_rate,
                stop_on_first_violation: args.get_flag("stop-on-violation"),
                ..SimulatorConfig::default()
            })
            .await;

            println!("{}", report.generate_text());
            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("demo", args)) => {
            let topic = args
                .get_one::<String>("topic")
                .map_or("Chairs", String::as_str);
            let mode = match args.get_one::<String>("view").map(String::as_str) {
                Some("marked") => ViewMode::MarkedOnly,
                Some("ai") => ViewMode::AiGenerated,
                Some("manual") => ViewMode::Manual,
                _ => ViewMode::All,
            };

            let engine = MindMapEngine::new(Arc::new(InMemoryCollaborator::new()), config);
            engine.open("demo", topic).await?;
            let root = engine
                .snapshot()
                .root()
                .map(|n| n.id.clone())
                .context("map has no root")?;

            let first = engine.diverge(&root).await?;
            if let Some(idea) = first.added.first() {
                engine.diverge(idea).await?;
                engine.toggle_mark(idea)?.settled().await?;
            }

            let view = engine.view(mode);
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}
