//! Per-subscriber delivery worker.
//!
//! Each worker is an independent task that alternates between waiting for
//! the next tick and delivering one item, until it is cancelled or evicted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::{DedupWindow, DeliveryCallback, SubscriberId, Subscription};

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// The cancellation handle was signalled or dropped.
    Cancelled,
    /// Consecutive failures reached the configured maximum.
    Evicted,
}

/// The delivery loop for a single subscriber.
pub(crate) struct DeliveryWorker {
    subscriber_id: SubscriberId,
    period: Duration,
    initial_delay: Duration,
    max_failures: u32,
    failures: u32,
    window: DedupWindow,
    callback: Arc<dyn DeliveryCallback>,
    cancel: oneshot::Receiver<()>,
}

impl DeliveryWorker {
    pub(crate) fn new(
        subscription: &Subscription,
        initial_delay: Duration,
        max_failures: u32,
        dedup_capacity: usize,
        callback: Arc<dyn DeliveryCallback>,
        cancel: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            subscriber_id: subscription.subscriber_id,
            period: subscription.period,
            initial_delay,
            max_failures,
            failures: 0,
            window: DedupWindow::new(dedup_capacity),
            callback,
            cancel,
        }
    }

    /// Run until cancelled or evicted.
    pub(crate) async fn run(mut self) -> WorkerExit {
        let subscriber_id = self.subscriber_id;
        info!(
            subscriber_id,
            delay_secs = self.initial_delay.as_secs(),
            period_secs = self.period.as_secs(),
            "delivery worker started"
        );

        let mut delay = self.initial_delay;
        loop {
            // Waiting
            let deadline = Instant::now() + delay;
            tokio::select! {
                biased;
                _ = &mut self.cancel => {
                    debug!(subscriber_id, "delivery worker cancelled");
                    return WorkerExit::Cancelled;
                }
                _ = sleep_until(deadline) => {}
            }

            // The timer and the signal can become ready together.
            if !matches!(self.cancel.try_recv(), Err(TryRecvError::Empty)) {
                debug!(subscriber_id, "delivery worker cancelled at tick");
                return WorkerExit::Cancelled;
            }

            // Delivering
            let started = Instant::now();
            let outcome = self.callback.deliver(subscriber_id, &self.window).await;
            let took = started.elapsed();

            match outcome {
                Ok(item) => {
                    debug!(subscriber_id, item = %item, took_ms = took.as_millis() as u64, "delivered");
                    self.window.add(item);
                    self.failures = 0;
                }
                Err(e) => {
                    self.failures += 1;
                    warn!(
                        subscriber_id,
                        failure_count = self.failures,
                        max_failures = self.max_failures,
                        error = %e,
                        "scheduled delivery failed"
                    );
                    if self.failures >= self.max_failures {
                        warn!(subscriber_id, "max failures reached, evicting subscription");
                        return WorkerExit::Evicted;
                    }
                }
            }

            // Subtract the delivery time so slow sends do not accumulate drift.
            delay = self.period.saturating_sub(took);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeliveryError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Replays a fixed script of outcomes, then always succeeds.
    struct Scripted {
        outcomes: Mutex<Vec<bool>>,
        seen: Mutex<Vec<Vec<String>>>,
        took: Duration,
    }

    impl Scripted {
        fn new(outcomes: Vec<bool>, took: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
                took,
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DeliveryCallback for Scripted {
        async fn deliver(
            &self,
            _subscriber_id: SubscriberId,
            recent: &DedupWindow,
        ) -> Result<String, DeliveryError> {
            let n = {
                let mut seen = self.seen.lock().unwrap();
                seen.push(recent.iter().map(str::to_string).collect());
                seen.len()
            };
            if !self.took.is_zero() {
                tokio::time::sleep(self.took).await;
            }
            let ok = self.outcomes.lock().unwrap().pop().unwrap_or(true);
            if ok {
                Ok(format!("item-{n}"))
            } else {
                Err(DeliveryError::new("send failed"))
            }
        }
    }

    fn worker(
        callback: Arc<Scripted>,
        period: Duration,
        max_failures: u32,
    ) -> (DeliveryWorker, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let sub = Subscription::new(1, Utc::now(), period);
        let worker = DeliveryWorker::new(&sub, Duration::from_secs(1), max_failures, 2, callback, rx);
        (worker, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_after_max_failures() {
        let callback = Scripted::new(vec![false, false, false], Duration::ZERO);
        let (worker, _tx) = worker(callback.clone(), Duration::from_secs(60), 3);

        let exit = worker.run().await;

        assert_eq!(exit, WorkerExit::Evicted);
        assert_eq!(callback.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let callback = Scripted::new(vec![false, false, true, false, false, true], Duration::ZERO);
        let (worker, tx) = worker(callback.clone(), Duration::from_secs(60), 3);
        let task = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_secs(1 + 60 * 10 + 30)).await;
        assert_eq!(callback.calls(), 11);

        tx.send(()).unwrap();
        assert_eq!(task.await.unwrap(), WorkerExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_carries_recent_items() {
        let callback = Scripted::new(vec![], Duration::ZERO);
        let (worker, tx) = worker(callback.clone(), Duration::from_secs(60), 3);
        let task = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_secs(1 + 60 * 3 + 30)).await;
        drop(tx);
        assert_eq!(task.await.unwrap(), WorkerExit::Cancelled);

        let seen = callback.seen.lock().unwrap().clone();
        assert_eq!(seen[0], Vec::<String>::new());
        assert_eq!(seen[1], vec!["item-1"]);
        assert_eq!(seen[2], vec!["item-1", "item-2"]);
        // Capacity two: the oldest item is gone.
        assert_eq!(seen[3], vec!["item-2", "item-3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_delivery_keeps_cadence() {
        let callback = Scripted::new(vec![], Duration::from_secs(20));
        let (worker, tx) = worker(callback.clone(), Duration::from_secs(60), 3);
        let start = Instant::now();
        let task = tokio::spawn(worker.run());

        // Ticks at 1s and 61s; a full-period sleep would put the second at 81s.
        tokio::time::sleep_until(start + Duration::from_secs(62)).await;
        assert_eq!(callback.calls(), 2);

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlong_delivery_fires_next_immediately() {
        let callback = Scripted::new(vec![], Duration::from_secs(90));
        let (worker, tx) = worker(callback.clone(), Duration::from_secs(60), 3);
        let start = Instant::now();
        let task = tokio::spawn(worker.run());

        // First call runs 1s..91s, the second starts right away at 91s.
        tokio::time::sleep_until(start + Duration::from_secs(92)).await;
        assert_eq!(callback.calls(), 2);

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_tick() {
        let callback = Scripted::new(vec![], Duration::ZERO);
        let (worker, tx) = worker(callback.clone(), Duration::from_secs(60), 3);
        let task = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(999)).await;
        tx.send(()).unwrap();
        assert_eq!(task.await.unwrap(), WorkerExit::Cancelled);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(callback.calls(), 0);
    }
}
