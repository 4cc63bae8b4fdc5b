//! Read-only projections over the store.

use clap::Subcommand;
use momentum_core::storage::Database;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Aggregate stats: energy, multiplier, tasks completed today
    Show,
    /// Paginated task history, most recent first
    History {
        #[arg(long, default_value = "20")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
    },
    /// Recently active sessions
    Sessions {
        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        StatsAction::Show => {
            let stats = db.dashboard_stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::History { limit, offset } => {
            let page = db.history_page(limit, offset)?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        StatsAction::Sessions { limit } => {
            let sessions = db.recent_sessions(limit)?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
    }
    Ok(())
}
