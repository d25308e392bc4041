//! taskq CLI — run latency simulations on bounded work queues.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskq::config::Config;
use taskq::sim;
use taskq::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "taskq", about = "Bounded-concurrency work queue simulations")]
struct Cli {
    /// Simulation TOML file (overrides TASKQ_SIMULATION_FILE)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Spread tasks over several work queues and report the average latency
    Simulate {
        /// Number of queues
        #[arg(long)]
        queues: Option<usize>,
        /// Per-queue concurrency limit (0 = unlimited)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Number of tasks to submit
        #[arg(long)]
        tasks: Option<u64>,
        /// Submit every task to every queue, keep the first finisher
        #[arg(long)]
        tied: bool,
    },
    /// Race slow requests against hedge attempts
    Hedge {
        /// Number of sequential requests
        #[arg(long)]
        requests: Option<u64>,
        /// Milliseconds to wait before hedging
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Hedge attempts per slow request
        #[arg(long)]
        candidates: Option<usize>,
        /// Levels of hedges allowed to hedge again
        #[arg(long)]
        max_depth: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "taskq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let mut simulation = config.simulation(cli.config.as_deref())?;

    match cli.command {
        Command::Simulate {
            queues,
            concurrency,
            tasks,
            tied,
        } => {
            let queue = &mut simulation.queue;
            if let Some(queues) = queues {
                queue.queue_count = queues;
            }
            if let Some(concurrency) = concurrency {
                queue.concurrency_limit = concurrency;
            }
            if let Some(tasks) = tasks {
                queue.task_count = tasks;
            }
            queue.tied_requests |= tied;

            let report = sim::queue::run(queue).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "--- {} tasks over {} queue(s), limit {}{}",
                    report.tasks,
                    report.queue_count,
                    report.concurrency_limit,
                    if report.tied_requests { ", tied" } else { "" }
                );
                println!("Avg Latency = {:.3} ms", report.average_latency_ms);
                println!("Wall Time   = {} ms", report.elapsed_ms);
                if report.tied_requests {
                    println!("Skipped     = {} tied copies", report.skipped_copies);
                }
            }
        }
        Command::Hedge {
            requests,
            timeout_ms,
            candidates,
            max_depth,
        } => {
            let hedged = &mut simulation.hedged;
            if let Some(requests) = requests {
                hedged.request_count = requests;
            }
            if let Some(timeout_ms) = timeout_ms {
                hedged.max_timeout_ms = timeout_ms;
            }
            if let Some(candidates) = candidates {
                hedged.candidates = candidates;
            }
            if let Some(depth) = max_depth {
                hedged.max_hedge_depth = depth;
            }

            let report = sim::hedged::run(hedged).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("--- After {} tests:", report.requests);
                println!("Avg Latency = {:.3} ms", report.average_latency_ms);
                println!(
                    "Hedged      = {} ({} won by a hedge)",
                    report.hedged, report.hedge_wins
                );
            }
        }
    }

    Ok(())
}
