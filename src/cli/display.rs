//! Rich CLI display for poll execution
//!
//! Renders tick envelopes as human-readable terminal output.
//! All output goes to stderr so stdout remains clean for piping.

use colored::Colorize;

use crate::cycle::controller::RunState;
use crate::cycle::event::{Envelope, TickPayload};

/// Display handler for one poll's terminal output
pub struct TickDisplay {
    poll_name: String,
}

impl TickDisplay {
    /// Create a new display handler for the given poll
    #[must_use]
    pub fn new(poll_name: &str) -> Self {
        Self {
            poll_name: poll_name.to_string(),
        }
    }

    /// Print the poll header at the start of a cycle
    pub fn print_header(&self, path: Option<&str>) {
        eprintln!(
            "\n{} {}",
            "===".bold().cyan(),
            format!("Poll: {}", self.poll_name).bold().cyan()
        );
        match path {
            Some(path) => eprintln!("  {} {path}", "Target:".dimmed()),
            None => eprintln!("  {} counter (no resource path)", "Target:".dimmed()),
        }
        eprintln!("{}", "─".repeat(50).dimmed());
    }

    /// Render one delivered envelope to stderr
    pub fn render_tick(&self, tick: u64, envelope: &Envelope) {
        eprintln!(
            "  {} {} {}",
            "▶".blue(),
            format!("tick {tick}").bold(),
            summarize_payload(&envelope.response).dimmed()
        );
    }

    /// Render a cycle-halting failure
    pub fn render_error(&self, error: &crate::error::Error) {
        eprintln!("  {} {}", "✗".red().bold(), error.to_string().red());
    }

    /// Render the post-cycle summary
    pub fn render_summary(&self, state: RunState, tick_count: u64) {
        eprintln!("{}", "─".repeat(50).dimmed());

        let status = match state {
            RunState::Inactive => "COMPLETED".green().bold().to_string(),
            RunState::Paused => "PAUSED".yellow().bold().to_string(),
            RunState::Running => "RUNNING".cyan().bold().to_string(),
        };
        eprintln!("  {} {}", status, self.poll_name.bold());
        eprintln!("  {} {tick_count} tick(s)", "Stats:".dimmed());
        eprintln!();
    }
}

/// Summarize a tick payload as a short one-line string
fn summarize_payload(payload: &TickPayload) -> String {
    match payload {
        TickPayload::Count(n) => format!("count={n}"),
        TickPayload::Json(value) => {
            let rendered = value.to_string();
            if rendered.len() > 120 {
                // Cut on a char boundary; JSON bodies are not always ASCII.
                // The last kept char must also end within the cap.
                let cut = rendered
                    .char_indices()
                    .take_while(|(i, c)| i + c.len_utf8() <= 117)
                    .last()
                    .map_or(0, |(i, c)| i + c.len_utf8());
                format!("{}...", &rendered[..cut])
            } else {
                rendered
            }
        }
    }
}
