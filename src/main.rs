use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use panel_flow::cli::{self, RunOptions};
use panel_flow::domain::discovery::AutoConnect;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pflow")]
#[command(about = "Replay and inspect panel data-flow scenarios", long_about = None)]
struct Cli {
    /// Log engine activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario against a fresh engine and print the resulting graph
    Run {
        /// Scenario JSON file
        scenario: PathBuf,

        /// Engine config JSON file (overrides the scenario's embedded config)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Discovery auto-connect policy
        #[arg(long, value_enum)]
        auto_connect: Option<AutoConnectArg>,

        /// Include the event log in the output
        #[arg(long)]
        events: bool,
    },
    /// Validate a scenario and list its data types
    Check {
        /// Scenario JSON file
        scenario: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AutoConnectArg {
    Automatic,
    SuggestOnly,
}

impl From<AutoConnectArg> for AutoConnect {
    fn from(arg: AutoConnectArg) -> Self {
        match arg {
            AutoConnectArg::Automatic => AutoConnect::Automatic,
            AutoConnectArg::SuggestOnly => AutoConnect::SuggestOnly,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = if cli.verbose {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            config,
            auto_connect,
            events,
        } => {
            let opts = RunOptions {
                config,
                auto_connect: auto_connect.map(Into::into),
                events,
            };
            cli::run(&scenario, &opts)?;
        }
        Commands::Check { scenario } => {
            cli::check(&scenario)?;
        }
    }

    Ok(())
}
