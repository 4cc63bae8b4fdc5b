//! Time estimate calibration.

use chrono::Local;
use momentum_core::calibration::{calibrate, UserSnapshot};
use momentum_core::storage::Database;
use momentum_core::Config;

/// Samples of category history considered for a learned multiplier.
const HISTORY_LIMIT: u32 = 20;

pub fn run(minutes: u32, category: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let config = Config::load()?;
    let snapshot = UserSnapshot::load(&db, &config)?;

    let learned = match &category {
        Some(category) => db.category_multiplier(category, HISTORY_LIMIT)?,
        None => None,
    };

    let calibration = calibrate(minutes, &snapshot, learned, &Local::now());
    println!("{}", serde_json::to_string_pretty(&calibration)?);
    println!(
        "Block {} minutes, not {}.",
        calibration.calibrated_estimate, calibration.original_estimate
    );
    Ok(())
}
