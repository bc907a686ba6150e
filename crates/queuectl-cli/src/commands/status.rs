//! Status command - job counts by state and active workers

use anyhow::Result;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, CellAlignment, Color, Table};

use queuectl_queue::{JobState, JobStore};

use super::{state_color, worker::pool_manager};
use crate::Context;

/// Run the status command
pub async fn run(ctx: &Context) -> Result<()> {
    let store = ctx.store().await?;
    let counts = store.counts_by_state().await?;
    let workers = pool_manager(ctx)?.status()?;

    println!("{}", "📋 Queue Status".bold().cyan());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("State").fg(Color::Cyan),
            Cell::new("Jobs").fg(Color::Cyan),
        ]);

    for state in JobState::ALL {
        table.add_row(vec![
            Cell::new(state).fg(state_color(state)),
            Cell::new(counts.get(state)).set_alignment(CellAlignment::Right),
        ]);
    }
    table.add_row(vec![
        Cell::new("total"),
        Cell::new(counts.total()).set_alignment(CellAlignment::Right),
    ]);

    println!("{table}");
    println!();

    let label = if workers > 0 {
        workers.to_string().green().bold()
    } else {
        workers.to_string().dimmed()
    };
    println!("Active workers: {}", label);
    println!("Database:       {}", ctx.db_path.display());
    Ok(())
}
