//! Arrival cycles: fetch, parse and normalize every configured stop.
//!
//! Each stop gets its own task. Tasks report to the [`PresentationSink`] as
//! soon as they settle and never affect one another; the cycle resolves once
//! all of them have settled and never fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::clock::Clock;
use crate::config::StopConfig;
use crate::normalizer::{ArrivalRecord, normalize};
use crate::parser::parse_feed;
use crate::presentation::PresentationSink;
use crate::stats::CycleStats;
use crate::upstream::FeedSource;

/// Result of one stop in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Arrivals(Vec<ArrivalRecord>),
    Failed(String),
}

/// State that lives as long as the orchestrator and is reset at the start
/// of every cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSession {
    pub last_updated: Option<DateTime<Tz>>,
    /// Failures of the current cycle, keyed by [`StopConfig::key`].
    pub errors: HashMap<String, String>,
}

pub struct OrchestratorSettings {
    pub agency: String,
    pub max_arrivals: usize,
    pub display_tz: Tz,
}

pub struct Orchestrator {
    stops: Vec<StopConfig>,
    settings: OrchestratorSettings,
    source: Arc<dyn FeedSource>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn PresentationSink>,
    session: Mutex<RefreshSession>,
    in_flight: AtomicBool,
}

impl Orchestrator {
    /// Section headers in `stops` are kept out of every cycle.
    pub fn new(
        stops: &[StopConfig],
        settings: OrchestratorSettings,
        source: Arc<dyn FeedSource>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn PresentationSink>,
    ) -> Self {
        Self {
            stops: stops.iter().filter(|s| !s.is_header()).cloned().collect(),
            settings,
            source,
            clock,
            sink,
            session: Mutex::new(RefreshSession::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn session(&self) -> RefreshSession {
        self.lock_session().clone()
    }

    /// Runs one arrival cycle over all stops.
    ///
    /// Returns `None` without doing anything when a cycle is already running.
    pub async fn refresh_all(self: &Arc<Self>) -> Option<CycleStats> {
        let in_flight = self.try_claim()?;
        Some(self.run_cycle(in_flight).await)
    }

    /// Starts a cycle on a background task. The in-flight flag is taken
    /// before returning, so of two concurrent callers exactly one gets a
    /// handle.
    pub fn spawn_refresh(self: &Arc<Self>) -> Option<JoinHandle<CycleStats>> {
        let in_flight = self.try_claim()?;
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run_cycle(in_flight).await }))
    }

    fn try_claim(self: &Arc<Self>) -> Option<InFlight> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh already in progress, ignoring");
            return None;
        }
        Some(InFlight(Arc::clone(self)))
    }

    #[tracing::instrument(name = "refresh_all", skip_all, fields(stops = self.stops.len()))]
    async fn run_cycle(self: &Arc<Self>, _in_flight: InFlight) -> CycleStats {
        let started_at = self.clock.now().with_timezone(&self.settings.display_tz);
        {
            let mut session = self.lock_session();
            session.last_updated = Some(started_at);
            session.errors.clear();
        }
        self.sink.cycle_started(started_at);

        let mut tasks = Vec::with_capacity(self.stops.len());
        for stop in &self.stops {
            let Some(stop_id) = stop.stop_id else {
                continue;
            };
            let span = tracing::info_span!(
                "fetch_stop",
                stop_id,
                label = %stop.label,
                line = stop.line.as_deref().unwrap_or("")
            );
            let this = Arc::clone(self);
            let task_stop = stop.clone();
            let handle = tokio::spawn(
                async move { this.run_stop(&task_stop, stop_id).await }.instrument(span),
            );
            tasks.push((stop, handle));
        }

        let mut stats = CycleStats::new(started_at);
        for (stop, handle) in tasks {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(stop_id = ?stop.stop_id, error = %e, "Fetch task did not complete");
                    let outcome = FetchOutcome::Failed(format!("fetch task failed: {e}"));
                    self.settle(stop, &outcome);
                    outcome
                }
            };
            stats.record(&outcome);
        }

        info!(
            with_arrivals = stats.with_arrivals,
            empty = stats.empty,
            failed = stats.failed,
            "Arrival cycle complete"
        );
        stats
    }

    async fn run_stop(&self, stop: &StopConfig, stop_id: u32) -> FetchOutcome {
        self.sink.stop_loading(stop);

        let outcome = match self.load_arrivals(stop_id, stop.line.as_deref()).await {
            Ok(arrivals) => {
                debug!(count = arrivals.len(), "Arrivals normalized");
                FetchOutcome::Arrivals(arrivals)
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!(error = %message, "Error fetching data for stop");
                FetchOutcome::Failed(message)
            }
        };

        self.settle(stop, &outcome);
        outcome
    }

    async fn load_arrivals(&self, stop_id: u32, line: Option<&str>) -> Result<Vec<ArrivalRecord>> {
        let body = self.source.fetch_feed(stop_id, &self.settings.agency).await?;
        let feed = parse_feed(&body)?;
        let now = self.clock.now().with_timezone(&self.settings.display_tz);
        Ok(normalize(&feed, line, &now, self.settings.max_arrivals))
    }

    fn settle(&self, stop: &StopConfig, outcome: &FetchOutcome) {
        if let FetchOutcome::Failed(msg) = outcome {
            self.lock_session().errors.insert(stop.key(), msg.clone());
        }
        self.sink.stop_settled(stop, outcome);
    }

    fn lock_session(&self) -> MutexGuard<'_, RefreshSession> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the in-flight flag when the cycle ends, including when the cycle
/// future is dropped part way through.
struct InFlight(Arc<Orchestrator>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}
