use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use super::scheduler::{CycleError, CycleSummary, Scheduler};
use crate::storage::FeedStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("tick interval must be greater than zero")]
    ZeroInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Waiting for the next tick
    Idle,
    /// One cycle in flight
    Running,
}

/// What one tick produced, published to observers after the cycle ends.
#[derive(Debug)]
pub struct CycleOutcome {
    /// 1-based cycle counter
    pub cycle: u64,
    pub result: Result<CycleSummary, CycleError>,
}

/// Runs a [`Scheduler`] cycle at startup and then on every tick.
///
/// A failed cycle is logged and forgotten; the next tick proceeds as usual.
/// Cycles never overlap, and ticks missed while a slow cycle was running are
/// skipped rather than replayed in a burst.
pub struct TickDriver<S> {
    scheduler: Scheduler<S>,
    interval: Duration,
    state: watch::Sender<DriverState>,
    cycles: u64,
    outcome_tx: Option<mpsc::Sender<CycleOutcome>>,
}

impl<S: FeedStore> TickDriver<S> {
    pub fn new(scheduler: Scheduler<S>, interval: Duration) -> Result<Self, DriverError> {
        if interval.is_zero() {
            return Err(DriverError::ZeroInterval);
        }
        let (state, _) = watch::channel(DriverState::Idle);
        Ok(Self {
            scheduler,
            interval,
            state,
            cycles: 0,
            outcome_tx: None,
        })
    }

    /// Publish every [`CycleOutcome`] on `tx`.
    ///
    /// Outcomes are dropped, not queued, while the channel is full or closed.
    pub fn with_outcomes(mut self, tx: mpsc::Sender<CycleOutcome>) -> Self {
        self.outcome_tx = Some(tx);
        self
    }

    pub fn state(&self) -> DriverState {
        *self.state.borrow()
    }

    /// Follow state transitions from another task.
    pub fn subscribe_state(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    /// Loop until `shutdown` becomes `true` or its sender is dropped.
    ///
    /// A cycle in flight when shutdown arrives is abandoned; its feed has
    /// already been stamped so nothing is lost but that feed's turn.
    /// Returns the number of cycles started.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval = ?self.interval, "Collecting feeds");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            self.cycles += 1;
            let cycle = self.cycles;
            self.state.send_replace(DriverState::Running);

            let result = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    tracing::info!(cycle, "Shutdown requested, abandoning cycle in flight");
                    break;
                }
                result = self.scheduler.run_cycle() => result,
            };

            log_outcome(cycle, &result);
            self.state.send_replace(DriverState::Idle);

            // Observers never block the loop.
            if let Some(tx) = &self.outcome_tx {
                if let Err(e) = tx.try_send(CycleOutcome { cycle, result }) {
                    tracing::debug!(cycle, error = %e, "Dropped cycle outcome");
                }
            }
        }

        self.state.send_replace(DriverState::Idle);
        tracing::info!(cycles = self.cycles, "Aggregation stopped");
        self.cycles
    }
}

/// Resolves once the flag reads `true` or the sender is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn log_outcome(cycle: u64, result: &Result<CycleSummary, CycleError>) {
    match result {
        Ok(summary) => tracing::info!(
            cycle,
            feed = %summary.feed.name,
            channel = %summary.channel_title,
            total = summary.report.total,
            inserted = summary.report.inserted,
            duplicates = summary.report.duplicates,
            failed = summary.report.failed,
            skipped = summary.report.skipped,
            "Feed collected"
        ),
        Err(CycleError::NoFeeds) => tracing::info!(cycle, "No feeds to fetch"),
        Err(e @ CycleError::Fetch { .. }) => tracing::warn!(cycle, error = %e, "Cycle failed"),
        Err(e @ CycleError::Claim(_)) => tracing::error!(cycle, error = %e, "Cycle failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Fetcher;
    use crate::storage::{DatabaseError, Feed, NewPost};
    use chrono::{DateTime, Utc};
    use std::sync::Arc;
    use tokio::sync::Notify;
    use tokio::time::Instant;
    use uuid::Uuid;

    /// Store with no feeds, or one whose every claim fails.
    struct StubStore {
        broken: bool,
    }

    impl FeedStore for StubStore {
        async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
            if self.broken {
                Err(DatabaseError::Other(sqlx::Error::PoolClosed))
            } else {
                Ok(None)
            }
        }

        async fn mark_feed_fetched(&self, _: Uuid, _: DateTime<Utc>) -> Result<(), DatabaseError> {
            Err(DatabaseError::NotFound)
        }

        async fn insert_post(&self, _: &NewPost) -> Result<(), DatabaseError> {
            Ok(())
        }
    }

    fn driver(broken: bool, interval: Duration) -> TickDriver<StubStore> {
        let scheduler = Scheduler::new(StubStore { broken }, Fetcher::new(reqwest::Client::new()));
        TickDriver::new(scheduler, interval).unwrap()
    }

    #[test]
    fn test_zero_interval_rejected() {
        let scheduler = Scheduler::new(
            StubStore { broken: false },
            Fetcher::new(reqwest::Client::new()),
        );
        assert_eq!(
            TickDriver::new(scheduler, Duration::ZERO).err(),
            Some(DriverError::ZeroInterval)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_tick() {
        let interval = Duration::from_secs(60);
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let start = Instant::now();
        let handle = tokio::spawn(driver(false, interval).with_outcomes(tx).run(stop_rx));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.cycle, 1);
        assert!(matches!(first.result, Err(CycleError::NoFeeds)));
        assert_eq!(start.elapsed(), Duration::ZERO);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.cycle, 2);
        assert!(matches!(second.result, Err(CycleError::NoFeeds)));
        assert!(start.elapsed() >= interval && start.elapsed() < interval * 2);

        stop_tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure_does_not_stop_loop() {
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(
            driver(true, Duration::from_secs(1))
                .with_outcomes(tx)
                .run(stop_rx),
        );

        for expected in 1..=3 {
            let outcome = rx.recv().await.unwrap();
            assert_eq!(outcome.cycle, expected);
            assert!(matches!(outcome.result, Err(CycleError::Claim(_))));
        }

        stop_tx.send(true).unwrap();
        assert!(handle.await.unwrap() >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_start_runs_nothing() {
        let (_stop_tx, stop_rx) = watch::channel(true);
        let cycles = driver(false, Duration::from_secs(1)).run(stop_rx).await;
        assert_eq!(cycles, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_shutdown_sender_stops_loop() {
        let (stop_tx, stop_rx) = watch::channel(false);
        drop(stop_tx);
        let cycles = driver(false, Duration::from_secs(1)).run(stop_rx).await;
        assert_eq!(cycles, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_returns_to_idle() {
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let driver = driver(false, Duration::from_secs(30)).with_outcomes(tx);
        assert_eq!(driver.state(), DriverState::Idle);
        let state = driver.subscribe_state();
        let handle = tokio::spawn(driver.run(stop_rx));

        rx.recv().await.unwrap();
        assert_eq!(*state.borrow(), DriverState::Idle);

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(*state.borrow(), DriverState::Idle);
    }

    /// Store whose claim waits until the test releases it.
    struct GatedStore {
        gate: Arc<Notify>,
    }

    impl FeedStore for GatedStore {
        async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
            self.gate.notified().await;
            Ok(None)
        }

        async fn mark_feed_fetched(&self, _: Uuid, _: DateTime<Utc>) -> Result<(), DatabaseError> {
            Ok(())
        }

        async fn insert_post(&self, _: &NewPost) -> Result<(), DatabaseError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_is_running_while_cycle_in_flight() {
        let gate = Arc::new(Notify::new());
        let scheduler = Scheduler::new(
            GatedStore { gate: gate.clone() },
            Fetcher::new(reqwest::Client::new()),
        );
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let driver = TickDriver::new(scheduler, Duration::from_secs(60))
            .unwrap()
            .with_outcomes(tx);
        let mut state = driver.subscribe_state();
        let handle = tokio::spawn(driver.run(stop_rx));

        state
            .wait_for(|s| *s == DriverState::Running)
            .await
            .unwrap();
        assert!(rx.try_recv().is_err(), "cycle finished before release");

        gate.notify_one();
        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome.result, Err(CycleError::NoFeeds)));
        assert_eq!(*state.borrow(), DriverState::Idle);

        stop_tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_outcomes_do_not_block_loop() {
        let (tx, _rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(
            driver(false, Duration::from_secs(1))
                .with_outcomes(tx)
                .run(stop_rx),
        );

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        stop_tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), 5);
    }
}
