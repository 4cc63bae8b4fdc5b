//! Foreground accountability sessions.
//!
//! Machine sessions are in-memory and die with the process, so the CLI runs
//! them attached: start, print each check-in as it fires, exit when the
//! block ends.

use std::sync::Arc;

use clap::Subcommand;
use momentum_core::bus::{BusEvent, EventBus, EventHandler, EventKind, HandlerResult};
use momentum_core::machines::AccountabilityMachine;
use momentum_core::Config;

#[derive(Subcommand)]
pub enum FocusAction {
    /// Run a monitored focus session to completion
    Run {
        /// What you're working on
        task: String,
        /// Session length in minutes
        minutes: u32,
        /// Check-in cadence in minutes (defaults from config)
        #[arg(long)]
        interval: Option<u32>,
    },
}

/// Prints bus traffic for the running session.
struct Printer;

#[async_trait::async_trait]
impl EventHandler for Printer {
    async fn handle(&self, event: &BusEvent) -> HandlerResult {
        match event.kind {
            EventKind::CheckinDue => {
                if let Some(prompt) = event.payload["prompt"].as_str() {
                    println!("\n{prompt}");
                }
            }
            EventKind::FocusBlockEnded => {
                println!(
                    "\nFocus block ended ({}) after {} check-ins.",
                    event.payload["status"].as_str().unwrap_or("unknown"),
                    event.payload["checkins_completed"]
                );
            }
            _ => {}
        }
        Ok(())
    }
}

pub fn run(action: FocusAction) -> Result<(), Box<dyn std::error::Error>> {
    let FocusAction::Run {
        task,
        minutes,
        interval,
    } = action;
    let config = Config::load()?;
    let interval = interval.unwrap_or(config.default_checkin_interval_min);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let bus = Arc::new(EventBus::new());
        let printer: Arc<dyn EventHandler> = Arc::new(Printer);
        bus.subscribe(EventKind::CheckinDue, printer.clone()).await;
        bus.subscribe(EventKind::FocusBlockEnded, printer).await;

        let machine = AccountabilityMachine::with_tick(bus, config.machine_tick());
        let started = machine.start_session(&task, minutes, interval).await?;
        println!("{}", started.message);

        machine.wait_idle().await;
        Ok(())
    })
}
