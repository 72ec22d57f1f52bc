//! Help desk demo
//!
//! Runs customer requests through the plan engine against the seeded
//! in-memory store and prints each answer with its interaction trace.

use std::path::PathBuf;

use clap::Parser;
use support_desk::{DeskConfig, SupportRuntime, REFERENCE_QUERIES};
use tracing_subscriber::{fmt, EnvFilter};

/// Command-line arguments for the help desk demo
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Requests to handle; the reference scenarios run when none are given
    queries: Vec<String>,

    /// JSON config file (engine, responder and routing sections)
    #[arg(short, long, default_value = "helpdesk.json")]
    config: PathBuf,

    /// Print each result as JSON instead of text
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("info,plan_engine=debug,support_desk=debug,planner_router=debug")
    } else {
        EnvFilter::new("warn,support_desk=info")
    };
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = DeskConfig::load(&args.config)?;
    // No model backend ships with the demo, so routing settles on the classifier.
    let runtime = SupportRuntime::from_config(&config, None)?;
    tracing::info!(planner = runtime.planner_name(), "help desk ready");

    let queries: Vec<String> = if args.queries.is_empty() {
        REFERENCE_QUERIES.iter().map(|query| query.to_string()).collect()
    } else {
        args.queries
    };

    for (index, query) in queries.iter().enumerate() {
        let result = runtime.handle(query).await;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
            continue;
        }
        println!("=== Scenario {}: {}", index + 1, query);
        println!("ANSWER\n{}\n", result.answer());
        println!("{}\n", result.a2a_log());
    }

    Ok(())
}
