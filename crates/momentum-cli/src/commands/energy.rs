//! Energy level and medication logging.

use chrono::{Local, Utc};
use clap::Subcommand;
use momentum_core::calibration::{keys, UserSnapshot};
use momentum_core::storage::Database;
use momentum_core::Config;

#[derive(Subcommand)]
pub enum EnergyAction {
    /// Record current energy level (1-10)
    Set { level: u8 },
    /// Log medication as taken just now
    Meds,
    /// Show the current snapshot, multiplier, and peak window
    Show,
}

pub fn run(action: EnergyAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let config = Config::load()?;

    match action {
        EnergyAction::Set { level } => {
            let level = level.clamp(1, 10);
            db.save_state(keys::ENERGY_LEVEL, &level)?;
            println!("energy = {level}/10");
        }
        EnergyAction::Meds => {
            db.save_state(keys::MEDICATION_TIME, &Utc::now())?;
            println!("medication logged");
        }
        EnergyAction::Show => {
            let snapshot = UserSnapshot::load(&db, &config)?;
            let now = Local::now();
            let report = serde_json::json!({
                "energy_level": snapshot.energy_level,
                "base_multiplier": snapshot.base_multiplier,
                "dynamic_multiplier": snapshot.dynamic_multiplier(&now),
                "peak_window": snapshot.peak_window_status(Utc::now()),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
