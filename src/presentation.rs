//! Display state of the arrival board.
//!
//! The orchestrator only talks to a [`PresentationSink`]; [`LiveBoard`] is
//! the sink used by the web page, the JSON endpoint and the terminal view.

use std::sync::Mutex;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::config::StopConfig;
use crate::normalizer::ArrivalRecord;
use crate::orchestrator::FetchOutcome;

/// Receives progress of an arrival cycle. Called concurrently from the
/// per-stop tasks.
pub trait PresentationSink: Send + Sync {
    fn cycle_started(&self, at: DateTime<Tz>);
    fn stop_loading(&self, stop: &StopConfig);
    fn stop_settled(&self, stop: &StopConfig, outcome: &FetchOutcome);
}

/// What one stop currently shows. Exactly one state at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum StopView {
    Loading,
    Arrivals(Vec<ArrivalRecord>),
    Empty,
    Error(String),
}

impl From<&FetchOutcome> for StopView {
    fn from(outcome: &FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Arrivals(a) if a.is_empty() => Self::Empty,
            FetchOutcome::Arrivals(a) => Self::Arrivals(a.clone()),
            FetchOutcome::Failed(msg) => Self::Error(msg.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoardRow {
    Section {
        label: String,
    },
    Stop {
        key: String,
        label: String,
        stop_id: u32,
        line: Option<String>,
        view: StopView,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Board {
    pub last_updated: Option<DateTime<Tz>>,
    pub rows: Vec<BoardRow>,
}

impl Board {
    /// Lays out `stops` in order, every stop starting out as loading.
    pub fn new(stops: &[StopConfig]) -> Self {
        let rows = stops
            .iter()
            .map(|stop| match stop.stop_id {
                None => BoardRow::Section {
                    label: stop.label.clone(),
                },
                Some(stop_id) => BoardRow::Stop {
                    key: stop.key(),
                    label: stop.label.clone(),
                    stop_id,
                    line: stop.line.clone(),
                    view: StopView::Loading,
                },
            })
            .collect();

        Self {
            last_updated: None,
            rows,
        }
    }

    /// The current view of the stop identified by `key`.
    pub fn view(&self, key: &str) -> Option<&StopView> {
        self.rows.iter().find_map(|row| match row {
            BoardRow::Stop { key: k, view, .. } if k == key => Some(view),
            _ => None,
        })
    }

    fn set_view(&mut self, key: &str, new_view: StopView) {
        for row in &mut self.rows {
            if let BoardRow::Stop { key: k, view, .. } = row {
                if k == key {
                    *view = new_view;
                    return;
                }
            }
        }
    }

    pub fn last_updated_label(&self) -> Option<String> {
        self.last_updated
            .map(|t| format!("Last updated: {}", t.format("%H:%M:%S")))
    }
}

/// A [`Board`] shared between the refresh tasks and its readers.
pub struct LiveBoard {
    inner: Mutex<Board>,
}

impl LiveBoard {
    pub fn new(stops: &[StopConfig]) -> Self {
        Self {
            inner: Mutex::new(Board::new(stops)),
        }
    }

    /// A copy of the board as it is right now.
    pub fn snapshot(&self) -> Board {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Board> {
        // A panicking writer leaves the board in a displayable state.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PresentationSink for LiveBoard {
    fn cycle_started(&self, at: DateTime<Tz>) {
        self.lock().last_updated = Some(at);
    }

    fn stop_loading(&self, stop: &StopConfig) {
        self.lock().set_view(&stop.key(), StopView::Loading);
    }

    fn stop_settled(&self, stop: &StopConfig, outcome: &FetchOutcome) {
        self.lock().set_view(&stop.key(), StopView::from(outcome));
    }
}
