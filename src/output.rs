//! Text and JSON renderings of the arrival board.

use std::fmt::Write;

use anyhow::Result;
use tracing::debug;

use crate::presentation::{Board, BoardRow, StopView};

pub const LOADING_MESSAGE: &str = "Loading arrivals...";
pub const EMPTY_MESSAGE: &str = "No upcoming arrivals found";
pub const UNAVAILABLE_MESSAGE: &str = "Unable to load arrivals";

/// Logs the board using Rust's debug pretty-print format.
pub fn print_pretty(board: &Board) {
    debug!("{:#?}", board);
}

/// Serializes the board as pretty-printed JSON.
pub fn to_json(board: &Board) -> Result<String> {
    Ok(serde_json::to_string_pretty(board)?)
}

/// Renders the board for a terminal.
pub fn render_text(board: &Board) -> String {
    let mut out = String::new();
    if let Some(label) = board.last_updated_label() {
        let _ = writeln!(out, "{label}");
    }

    for row in &board.rows {
        match row {
            BoardRow::Section { label } => {
                let _ = writeln!(out, "\n{label}");
            }
            BoardRow::Stop { label, view, .. } => {
                let _ = writeln!(out, "  {label}");
                match view {
                    StopView::Loading => {
                        let _ = writeln!(out, "    {LOADING_MESSAGE}");
                    }
                    StopView::Empty => {
                        let _ = writeln!(out, "    {EMPTY_MESSAGE}");
                    }
                    StopView::Error(msg) => {
                        let _ = writeln!(out, "    {UNAVAILABLE_MESSAGE}");
                        let _ = writeln!(out, "    Error: {msg}");
                    }
                    StopView::Arrivals(arrivals) => {
                        for a in arrivals {
                            let _ = writeln!(
                                out,
                                "    {:>4}  {}  {}",
                                format!("{}m", a.minutes_away),
                                a.formatted_time,
                                a.line_ref
                            );
                        }
                    }
                }
            }
        }
    }
    out
}
