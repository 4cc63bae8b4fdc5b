//! Raw key-value state access.

use clap::Subcommand;
use momentum_core::storage::Database;

#[derive(Subcommand)]
pub enum StateAction {
    /// Print the value stored under a key
    Get {
        key: String,
        /// Fallback printed when the key is absent
        #[arg(long)]
        default: Option<String>,
    },
    /// Store a JSON value under a key
    Set {
        key: String,
        /// JSON value ("7", "\"deep work\"", "{\"a\":1}")
        value: String,
    },
}

pub fn run(action: StateAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        StateAction::Get { key, default } => {
            match db.get_state::<serde_json::Value>(&key)? {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => match default {
                    Some(fallback) => println!("{fallback}"),
                    None => println!("null"),
                },
            }
        }
        StateAction::Set { key, value } => {
            let parsed: serde_json::Value = serde_json::from_str(&value)
                .map_err(|e| format!("value must be valid JSON: {e}"))?;
            db.save_state(&key, &parsed)?;
            println!("ok");
        }
    }
    Ok(())
}
