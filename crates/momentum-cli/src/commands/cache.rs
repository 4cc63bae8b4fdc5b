//! Decomposition plan cache access.

use std::sync::Arc;

use clap::Subcommand;
use momentum_core::cache::{CacheLookup, PlanCache};
use momentum_core::calibration::keys;
use momentum_core::storage::Database;

#[derive(Subcommand)]
pub enum CacheAction {
    /// Look up a cached decomposition for a task description
    Check { description: String },
    /// Store a decomposition plan (JSON) for a task description
    Store {
        description: String,
        /// Plan as a JSON document
        plan: String,
    },
    /// List cached descriptions similar to a query
    Similar {
        description: String,
        #[arg(long, default_value = "3")]
        limit: usize,
    },
}

pub fn run(action: CacheAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(Database::open()?);
    let cache = PlanCache::new(Arc::clone(&db));

    match action {
        CacheAction::Check { description } => match cache.check(&description)? {
            CacheLookup::Hit {
                plan,
                energy_level_at_creation,
                cached_at,
            } => {
                println!("{}", serde_json::to_string_pretty(&plan)?);
                println!(
                    "cached {} at energy {energy_level_at_creation}/10",
                    cached_at.format("%Y-%m-%d %H:%M")
                );
            }
            CacheLookup::Miss { similar } => {
                println!("no cache hit");
                if !similar.is_empty() {
                    println!("similar: {}", similar.join(", "));
                }
            }
        },
        CacheAction::Store { description, plan } => {
            let plan: serde_json::Value =
                serde_json::from_str(&plan).map_err(|e| format!("plan must be valid JSON: {e}"))?;
            let energy = db.get_state_or(keys::ENERGY_LEVEL, 5u8)?;
            let hash = cache.store(&description, &plan, energy)?;
            println!("stored under {hash}");
        }
        CacheAction::Similar { description, limit } => {
            for similar in cache.similar(&description, limit)? {
                println!("{similar}");
            }
        }
    }
    Ok(())
}
