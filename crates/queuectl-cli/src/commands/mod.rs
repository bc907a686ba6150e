//! CLI commands

pub mod config;
pub mod dlq;
pub mod enqueue;
pub mod list;
pub mod status;
pub mod worker;

use chrono::{DateTime, Local, Utc};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use queuectl_queue::{Job, JobState};

pub(crate) fn state_color(state: JobState) -> Color {
    match state {
        JobState::Pending => Color::White,
        JobState::Processing => Color::Blue,
        JobState::Completed => Color::Green,
        JobState::Failed => Color::Yellow,
        JobState::Dead => Color::Red,
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Standard job table used by `list` and `dlq list`.
pub(crate) fn job_table(jobs: &[Job]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("State").fg(Color::Cyan),
            Cell::new("Attempts").fg(Color::Cyan),
            Cell::new("Command").fg(Color::Cyan),
            Cell::new("Next attempt").fg(Color::Cyan),
            Cell::new("Last error").fg(Color::Cyan),
            Cell::new("Updated").fg(Color::Cyan),
        ]);

    for job in jobs {
        table.add_row(vec![
            Cell::new(&job.id).fg(Color::Green),
            Cell::new(job.state).fg(state_color(job.state)),
            Cell::new(format!("{}/{}", job.attempts, job.max_retries + 1)),
            Cell::new(&job.command),
            Cell::new(job.next_attempt_at.map(timestamp).unwrap_or_else(|| "-".into())),
            Cell::new(job.last_error.as_deref().unwrap_or("-")),
            Cell::new(timestamp(job.updated_at)),
        ]);
    }
    table
}
