//! HTML entry page of the arrival board.

use std::fmt::Write;
use std::time::Duration;

use quick_xml::escape::escape;

use crate::output::{EMPTY_MESSAGE, LOADING_MESSAGE, UNAVAILABLE_MESSAGE};
use crate::presentation::{Board, BoardRow, StopView};

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 0 auto; max-width: 40rem; padding: 1rem; background: #f5f5f7; color: #1d1d1f; }
header { display: flex; justify-content: space-between; align-items: center; }
#refresh-button { border: 0; border-radius: 6px; padding: .5rem 1rem; background: #0071e3; color: #fff; cursor: pointer; transition: transform .1s; }
#refresh-button.clicked { transform: scale(.95); }
#last-updated { color: #6e6e73; font-size: .85rem; }
.sectionLabel { margin-top: 1.5rem; font-weight: 600; text-transform: uppercase; font-size: .8rem; color: #6e6e73; }
.stop { background: #fff; border-radius: 10px; padding: .75rem 1rem; margin-top: .5rem; }
.stopLabel { font-weight: 600; }
.arrivalTimes { display: flex; flex-wrap: wrap; gap: .5rem; margin-top: .4rem; }
.arrival { background: #f0f0f5; border-radius: 6px; padding: .2rem .5rem; }
.away { font-weight: 600; margin-right: .3rem; }
.loading, .empty-message { color: #6e6e73; }
.error-message { color: #d70015; margin-top: .4rem; }
"#;

const SCRIPT: &str = r#"
document.getElementById('refresh-button').addEventListener('click', async (event) => {
  const button = event.currentTarget;
  button.classList.add('clicked');
  setTimeout(() => button.classList.remove('clicked'), 300);
  await fetch('/api/refresh', { method: 'POST' });
  setTimeout(() => window.location.reload(), 1500);
});
"#;

/// Renders the full page. The browser reloads it every `refresh_interval`.
pub fn render_board(board: &Board, refresh_interval: Duration) -> String {
    let mut body = String::new();
    for row in &board.rows {
        match row {
            BoardRow::Section { label } => {
                let _ = writeln!(body, r#"<div class="sectionLabel">{}</div>"#, escape(label));
            }
            BoardRow::Stop {
                key, label, view, ..
            } => {
                let _ = writeln!(body, r#"<div class="stop">"#);
                let _ = writeln!(body, r#"  <div class="stopLabel">{}</div>"#, escape(label));
                let _ = writeln!(
                    body,
                    r#"  <div class="arrivalTimes" id="arrivalTimes-{}">{}</div>"#,
                    escape(key),
                    render_view(view)
                );
                if let StopView::Error(msg) = view {
                    let _ = writeln!(
                        body,
                        r#"  <div class="error-message">Error: {}</div>"#,
                        escape(msg)
                    );
                }
                let _ = writeln!(body, "</div>");
            }
        }
    }

    let last_updated = board.last_updated_label().unwrap_or_default();
    layout(
        &format!(
            r#"<div id="last-updated">{last_updated}</div>
<div id="results">
{body}</div>"#
        ),
        Some(refresh_interval),
    )
}

/// Shown instead of the board when the server has no API key.
pub fn render_setup_instructions() -> String {
    layout(
        r#"<div class="setup-instructions">
  <h2>Setup Instructions</h2>
  <ol>
    <li>Request an API key at <a href="https://511.org/open-data/token" target="_blank">511.org/open-data/token</a></li>
    <li>Create a file named <code>.env</code> next to the binary</li>
    <li>Add <code>API_KEY=&lt;your key&gt;</code> to the <code>.env</code> file</li>
    <li>Optionally point <code>STOPS_FILE</code> at a JSON list of stops</li>
    <li>Restart the server</li>
  </ol>
</div>"#,
        None,
    )
}

fn render_view(view: &StopView) -> String {
    match view {
        StopView::Loading => format!(r#"<div class="loading">{LOADING_MESSAGE}</div>"#),
        StopView::Empty => format!(r#"<div class="empty-message">{EMPTY_MESSAGE}</div>"#),
        StopView::Error(_) => format!(r#"<div class="empty-message">{UNAVAILABLE_MESSAGE}</div>"#),
        StopView::Arrivals(arrivals) => arrivals
            .iter()
            .map(|a| {
                format!(
                    r#"<div class="arrival"><span class="away">{}m</span><span class="time">{}</span></div>"#,
                    a.minutes_away,
                    escape(a.formatted_time.as_str())
                )
            })
            .collect(),
    }
}

fn layout(content: &str, reload_after: Option<Duration>) -> String {
    let meta_refresh = reload_after
        .map(|d| {
            format!(
                r#"<meta http-equiv="refresh" content="{}">"#,
                d.as_secs().max(1)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
{meta_refresh}
<title>Personal Transit Monitor</title>
<style>{STYLE}</style>
</head>
<body>
<header>
<h1>Transit Monitor</h1>
<button id="refresh-button" type="button">Refresh</button>
</header>
{content}
<script>{SCRIPT}</script>
</body>
</html>
"#
    )
}
