use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "momentum-cli", version, about = "Momentum CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// User state management
    State {
        #[command(subcommand)]
        action: commands::state::StateAction,
    },
    /// Energy level and medication logging
    Energy {
        #[command(subcommand)]
        action: commands::energy::EnergyAction,
    },
    /// Calibrate a time estimate
    Calibrate {
        /// Raw estimate in minutes
        minutes: u32,
        /// Task category for learned corrections
        #[arg(long)]
        category: Option<String>,
    },
    /// Task completion logging and history
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Decomposition plan cache
    Cache {
        #[command(subcommand)]
        action: commands::cache::CacheAction,
    },
    /// Accountability focus sessions
    Focus {
        #[command(subcommand)]
        action: commands::focus::FocusAction,
    },
    /// Hyperfocus guardrail
    Guardrail {
        #[command(subcommand)]
        action: commands::guardrail::GuardrailAction,
    },
    /// Read-only stats projections
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Conversation session management
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::State { action } => commands::state::run(action),
        Commands::Energy { action } => commands::energy::run(action),
        Commands::Calibrate { minutes, category } => commands::calibrate::run(minutes, category),
        Commands::Task { action } => commands::task::run(action),
        Commands::Cache { action } => commands::cache::run(action),
        Commands::Focus { action } => commands::focus::run(action),
        Commands::Guardrail { action } => commands::guardrail::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Session { action } => commands::session::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
