//! Task completion logging and history.

use std::sync::Arc;

use clap::Subcommand;
use momentum_core::bus::{EventBus, EventKind};
use momentum_core::calibration::UserSnapshot;
use momentum_core::storage::Database;
use momentum_core::tracker::{record_task_completion, DivergenceWatcher};
use momentum_core::Config;

#[derive(Subcommand)]
pub enum TaskAction {
    /// Log a completed task for calibration learning
    Log {
        category: String,
        /// Estimated duration in minutes
        estimated: u32,
        /// Actual duration in minutes
        actual: u32,
    },
    /// Show recent completion history
    History {
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(Database::open()?);
    match action {
        TaskAction::Log {
            category,
            estimated,
            actual,
        } => {
            let config = Config::load()?;
            let snapshot = UserSnapshot::load(&db, &config)?;
            let runtime = tokio::runtime::Runtime::new()?;
            let ratio = runtime.block_on(async {
                let bus = EventBus::new();
                bus.subscribe(
                    EventKind::TaskCompleted,
                    Arc::new(DivergenceWatcher::new(Arc::clone(&db))),
                )
                .await;
                record_task_completion(&db, &bus, &snapshot, &category, estimated, actual).await
            })?;

            let feedback = if (0.8..=1.2).contains(&ratio) {
                "Great data point!"
            } else {
                "Estimate was off - the multiplier will adjust."
            };
            println!("logged, ratio = {ratio:.2}. {feedback}");
        }
        TaskAction::History { limit } => {
            let history = db.recent_history(limit)?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
    }
    Ok(())
}
