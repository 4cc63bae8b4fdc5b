//! Foreground hyperfocus guardrail.

use std::sync::Arc;

use clap::Subcommand;
use momentum_core::bus::EventBus;
use momentum_core::machines::GuardrailMachine;
use momentum_core::Config;

#[derive(Subcommand)]
pub enum GuardrailAction {
    /// Arm a hard stop and wait for it (warnings print as they fire)
    Run {
        /// Minutes until the hard stop
        minutes: u32,
        /// Why the stop matters ("meeting at 2pm", "bedtime")
        reason: String,
    },
}

pub fn run(action: GuardrailAction) -> Result<(), Box<dyn std::error::Error>> {
    let GuardrailAction::Run { minutes, reason } = action;
    let config = Config::load()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let bus = Arc::new(EventBus::new());
        let machine = GuardrailMachine::with_tick(bus, config.machine_tick());

        let set = machine.set_hard_stop(minutes, &reason).await?;
        println!("{}", set.message);

        machine.wait_clear().await;
        println!("Hard stop reached. Step away.");
        Ok(())
    })
}
