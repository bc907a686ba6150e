//! Config command - show or change queue defaults
//!
//! Usage:
//! ```bash
//! queuectl config get
//! queuectl config get backoff-base
//! queuectl config set max-retries 5
//! ```

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use crate::settings::{config_file, Settings, KEYS};
use crate::{print_success, Context};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show one setting, or all of them
    #[command(name = "get")]
    Get {
        /// max-retries, backoff-base, job-timeout or poll-interval-ms
        key: Option<String>,
    },

    /// Change a setting
    #[command(name = "set")]
    Set {
        /// max-retries, backoff-base, job-timeout or poll-interval-ms
        key: String,
        value: String,
    },
}

/// Run the config command
pub fn run(ctx: &Context, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Get { key: Some(key) } => {
            println!("{}", ctx.settings.get(&key)?);
        }
        ConfigCommand::Get { key: None } => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Key").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);
            for key in KEYS {
                table.add_row(vec![
                    Cell::new(key).fg(Color::Green),
                    Cell::new(ctx.settings.get(key)?),
                ]);
            }
            println!("{table}");
            println!("File: {}", config_file(&ctx.home).display());
        }
        ConfigCommand::Set { key, value } => {
            // environment overrides stay out of the file
            let mut settings = Settings::load_file(&ctx.home).unwrap_or_default();
            settings.set(&key, &value)?;
            settings.save(&ctx.home)?;
            print_success(&format!("{} = {}", key, settings.get(&key)?));
        }
    }
    Ok(())
}
