use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::orchestrator::Orchestrator;

/// Owns the periodic refresh task. At most one task runs per handle:
/// starting again replaces the previous task, dropping the handle stops it.
#[derive(Default)]
pub struct RefreshTimer {
    handle: Option<JoinHandle<()>>,
}

impl RefreshTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a cycle right away and then every `period`.
    pub fn start(&mut self, orchestrator: Arc<Orchestrator>, period: Duration) {
        self.stop();

        let period = period.max(Duration::from_millis(1));
        info!(period_ms = period.as_millis(), "Starting auto refresh");
        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                orchestrator.refresh_all().await;
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::default_stops;
    use crate::orchestrator::OrchestratorSettings;
    use crate::presentation::LiveBoard;
    use crate::upstream::FeedSource;
    use anyhow::Result;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource(AtomicUsize);

    #[async_trait]
    impl FeedSource for CountingSource {
        async fn fetch_feed(&self, _stop_code: u32, _agency: &str) -> Result<Bytes> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(b"<Siri/>"))
        }
    }

    fn orchestrator(source: Arc<CountingSource>) -> Arc<Orchestrator> {
        let stops = default_stops();
        Arc::new(Orchestrator::new(
            &stops,
            OrchestratorSettings {
                agency: "SF".to_string(),
                max_arrivals: 10,
                display_tz: chrono_tz::UTC,
            },
            source,
            Arc::new(SystemClock),
            Arc::new(LiveBoard::new(&stops)),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_period() {
        let source = Arc::new(CountingSource::default());
        let mut timer = RefreshTimer::new();
        timer.start(orchestrator(source.clone()), Duration::from_secs(60));
        assert!(timer.is_running());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 5);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_task() {
        let source = Arc::new(CountingSource::default());
        let orchestrator = orchestrator(source.clone());
        let mut timer = RefreshTimer::new();

        timer.start(orchestrator.clone(), Duration::from_secs(60));
        timer.start(orchestrator, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(61)).await;
        // one immediate cycle plus one tick; a leaked first timer would double it
        assert_eq!(source.0.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_refresh() {
        let source = Arc::new(CountingSource::default());
        let mut timer = RefreshTimer::new();
        timer.start(orchestrator(source.clone()), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(10)).await;

        timer.stop();
        assert!(!timer.is_running());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 5);
    }
}
