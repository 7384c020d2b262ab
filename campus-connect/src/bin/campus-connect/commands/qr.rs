use anyhow::Result;
use clap::{Subcommand, ValueEnum};

use campus_connect::QrTarget;

use crate::{examples::ExampleGroup, output::OutputManager};

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "QR payloads",
    commands: &[
        "campus-connect qr decode soc:chess        # Which page a scanned code opens",
        "campus-connect qr encode event E1         # Payload to print on a poster",
    ],
}];

#[derive(Clone, Copy, ValueEnum)]
pub enum QrKind {
    Event,
    Society,
}

#[derive(Subcommand)]
pub enum QrCommands {
    /// Decode a scanned payload
    Decode { payload: String },

    /// Build the payload for an event or society page
    Encode { kind: QrKind, id: String },
}

pub fn handle_qr_commands(command: QrCommands, output: &OutputManager) -> Result<()> {
    match command {
        QrCommands::Decode { payload } => {
            let target = QrTarget::decode(&payload)?;
            let kind = match target {
                QrTarget::Society(_) => "society",
                QrTarget::Event(_) => "event",
            };
            output.key_value("kind", kind);
            output.key_value("id", target.id());
        }
        QrCommands::Encode { kind, id } => {
            let target = match kind {
                QrKind::Event => QrTarget::Event(id),
                QrKind::Society => QrTarget::Society(id),
            };
            println!("{}", target.encode());
        }
    }
    Ok(())
}
