//! Conversation session management.

use std::sync::Arc;

use clap::Subcommand;
use momentum_core::session::SessionService;
use momentum_core::storage::Database;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Create a session (id generated when omitted)
    Create {
        #[arg(long, default_value = "momentum")]
        app: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        id: Option<String>,
    },
    /// Print a session and its events
    Show { id: String },
    /// List sessions for a user, newest first
    List {
        #[arg(long)]
        user: String,
    },
    /// Delete a session and its events
    Delete { id: String },
    /// Append an event to a session
    AppendEvent {
        id: String,
        #[arg(long)]
        event_type: String,
        /// Event payload as JSON
        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// Merge a JSON patch into session state (atomic)
    Patch {
        id: String,
        /// JSON object to merge
        patch: String,
    },
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = SessionService::new(Arc::new(Database::open()?));
    match action {
        SessionAction::Create { app, user, id } => {
            let session = service.create_session(&app, &user, None, id)?;
            println!("{}", session.id);
        }
        SessionAction::Show { id } => match service.get_session(&id)? {
            Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
            None => println!("not found"),
        },
        SessionAction::List { user } => {
            let sessions = service.list_sessions(&user)?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        SessionAction::Delete { id } => {
            if service.delete_session(&id)? {
                println!("deleted");
            } else {
                println!("not found");
            }
        }
        SessionAction::AppendEvent {
            id,
            event_type,
            data,
        } => {
            let data: serde_json::Value =
                serde_json::from_str(&data).map_err(|e| format!("data must be valid JSON: {e}"))?;
            match service.append_event(&id, &event_type, data)? {
                Some(event) => println!("appended at {}", event.timestamp.to_rfc3339()),
                None => println!("not found"),
            }
        }
        SessionAction::Patch { id, patch } => {
            let patch: serde_json::Value = serde_json::from_str(&patch)
                .map_err(|e| format!("patch must be valid JSON: {e}"))?;
            let Some(object) = patch.as_object().cloned() else {
                return Err("patch must be a JSON object".into());
            };
            if service.update_session_state(&id, object)? {
                println!("patched");
            } else {
                println!("not found");
            }
        }
    }
    Ok(())
}
