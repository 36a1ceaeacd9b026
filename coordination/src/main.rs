//! `debate` command line.
//!
//! ```bash
//! debate solve "What is 12 * 6?"
//! debate solve --workflow expert_panel --rounds 2 --json "..."
//! debate topology --solvers 6 --neighbors 2
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use debate_coordination::{
    DebateManager, EngineConfig, EventHistory, HttpOracle, LoggingCallback, ScriptedOracle,
    Workflow,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-agent debate engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one debate and print the answer
    Solve {
        /// The question to debate
        question: String,

        #[command(flatten)]
        engine: EngineArgs,

        /// Print the event transcript as JSON lines
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the subscription plan for the configured workflow
    Topology {
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct EngineArgs {
    /// TOML config file (defaults apply for missing keys)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Workflow: ring or expert_panel (overrides DEBATE_WORKFLOW)
    #[arg(long)]
    workflow: Option<Workflow>,

    /// Number of ring solvers (overrides DEBATE_NUM_SOLVERS)
    #[arg(long)]
    solvers: Option<usize>,

    /// Peers each solver waits for per round
    #[arg(long)]
    neighbors: Option<usize>,

    /// Debate rounds per solver (overrides DEBATE_MAX_ROUNDS)
    #[arg(long)]
    rounds: Option<u32>,
}

impl EngineArgs {
    /// File, then environment, then flags.
    fn load(&self) -> Result<EngineConfig> {
        let base = match &self.config {
            Some(path) => EngineConfig::from_toml_file(path)?,
            None => EngineConfig::default(),
        };
        let mut config = base.with_env_overrides()?;
        if let Some(workflow) = self.workflow {
            config.workflow = workflow;
        }
        if let Some(solvers) = self.solvers {
            config.num_solvers = solvers;
        }
        if let Some(neighbors) = self.neighbors {
            config.neighbors = neighbors;
        }
        if let Some(rounds) = self.rounds {
            config.max_rounds = rounds;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debate_coordination=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Solve {
            question,
            engine,
            json,
        } => {
            let config = engine.load()?;
            let oracle = HttpOracle::new(config.oracle.clone()).context("building oracle client")?;
            tracing::info!(
                model = oracle.model(),
                workflow = %config.workflow,
                "Starting debate"
            );

            let mut manager = DebateManager::new(config, Arc::new(oracle))?;
            manager.register_callback(Arc::new(LoggingCallback));
            let outcome = manager.solve(&question).await?;

            let history = EventHistory::new();
            history.record_all(outcome.events.iter().cloned());
            if json {
                print!("{}", history.to_json_lines()?);
            } else {
                let stats = history.stats();
                match outcome.answer_content() {
                    Some(answer) => println!("{}", answer),
                    None => println!("(no answer)"),
                }
                eprintln!(
                    "{} events, {} responses, {} failures in {} ms",
                    stats.total_events,
                    stats.responses,
                    outcome.failures.len(),
                    outcome.elapsed_ms
                );
            }
        }
        Command::Topology { engine } => {
            let config = engine.load()?;
            // Planning needs no endpoint.
            let manager = DebateManager::new(config, Arc::new(ScriptedOracle::new()))?;
            let plan = manager.plan()?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
    }

    Ok(())
}
