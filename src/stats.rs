use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::orchestrator::FetchOutcome;

/// Counts of how the stops of one arrival cycle settled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub started_at: Option<DateTime<Tz>>,
    pub stops: usize,
    pub with_arrivals: usize,
    pub empty: usize,
    pub failed: usize,
    pub arrivals: usize,
}

impl CycleStats {
    pub fn new(started_at: DateTime<Tz>) -> Self {
        Self {
            started_at: Some(started_at),
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &FetchOutcome) {
        self.stops += 1;
        match outcome {
            FetchOutcome::Arrivals(a) if a.is_empty() => self.empty += 1,
            FetchOutcome::Arrivals(a) => {
                self.with_arrivals += 1;
                self.arrivals += a.len();
            }
            FetchOutcome::Failed(_) => self.failed += 1,
        }
    }
}
