//! Scheduler core: the registry of live delivery workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, info};

use crate::worker::{DeliveryWorker, WorkerExit};
use crate::{
    DeliveryCallback, SchedulerConfig, SchedulerError, SubscriberId, Subscription,
    SubscriptionStore,
};

/// Cancellation handle for one running worker.
struct WorkerHandle {
    subscription: Subscription,
    generation: u64,
    cancel: oneshot::Sender<()>,
}

impl WorkerHandle {
    fn cancel(self) {
        // The worker may already have exited; nothing to do then.
        let _ = self.cancel.send(());
    }
}

/// Registry state guarded by the scheduler lock.
#[derive(Default)]
struct Registry {
    workers: HashMap<SubscriberId, WorkerHandle>,
    next_generation: u64,
}

struct Inner {
    store: Arc<dyn SubscriptionStore>,
    config: SchedulerConfig,
    registry: Mutex<Registry>,
}

/// Owns one worker per active subscriber.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct SchedulerCore {
    inner: Arc<Inner>,
}

impl SchedulerCore {
    /// Create a scheduler backed by `store`.
    ///
    /// Fails with [`SchedulerError::InvalidConfig`] when `config` is unusable.
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                config,
                registry: Mutex::new(Registry::default()),
            }),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Get the active subscription for a subscriber.
    ///
    /// The registry, not the store, decides whether a subscription is active.
    pub async fn get(&self, subscriber_id: SubscriberId) -> Result<Subscription, SchedulerError> {
        self.inner
            .registry
            .lock()
            .await
            .workers
            .get(&subscriber_id)
            .map(|h| h.subscription.clone())
            .ok_or(SchedulerError::NotFound(subscriber_id))
    }

    /// Create (or replace) a subscription and start its worker.
    ///
    /// Any existing worker for the subscriber is cancelled first. The new
    /// worker delivers after the configured short creation delay.
    #[tracing::instrument(skip(self, subscription, callback), fields(subscriber_id = subscription.subscriber_id))]
    pub async fn create(
        &self,
        subscription: Subscription,
        callback: Arc<dyn DeliveryCallback>,
    ) -> Result<(), SchedulerError> {
        let mut registry = self.inner.registry.lock().await;

        if let Some(old) = registry.workers.remove(&subscription.subscriber_id) {
            debug!(generation = old.generation, "replacing running worker");
            old.cancel();
        }

        self.inner.store.create(&subscription).await?;

        let delay = self.inner.config.create_delay;
        let handle = self.spawn_worker(&mut registry, subscription.clone(), delay, callback);
        registry.workers.insert(subscription.subscriber_id, handle);

        info!(period_secs = subscription.period.as_secs(), "subscription created");
        Ok(())
    }

    /// Delete a subscription and stop its worker.
    ///
    /// On a store failure the worker keeps running.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, subscriber_id: SubscriberId) -> Result<(), SchedulerError> {
        let mut registry = self.inner.registry.lock().await;

        if !registry.workers.contains_key(&subscriber_id) {
            return Err(SchedulerError::NotFound(subscriber_id));
        }

        self.inner.store.delete(subscriber_id).await?;

        if let Some(handle) = registry.workers.remove(&subscriber_id) {
            handle.cancel();
        }

        info!("subscription deleted");
        Ok(())
    }

    /// Rebuild every worker from the persisted subscriptions.
    ///
    /// Meant to run once at startup, before any other call. Each worker
    /// resumes on its subscription's phase grid. Returns how many
    /// subscriptions were rescheduled.
    #[tracing::instrument(skip(self, callback))]
    pub async fn reschedule_existing(
        &self,
        callback: Arc<dyn DeliveryCallback>,
    ) -> Result<usize, SchedulerError> {
        let mut registry = self.inner.registry.lock().await;

        let subscriptions = self.inner.store.get_all().await?;

        for (_, handle) in registry.workers.drain() {
            handle.cancel();
        }

        let now = Utc::now();
        for subscription in subscriptions {
            let delay = subscription.delay_until_next(now);
            let id = subscription.subscriber_id;
            let handle =
                self.spawn_worker(&mut registry, subscription, delay, Arc::clone(&callback));
            registry.workers.insert(id, handle);
        }

        let count = registry.workers.len();
        info!(count, "rescheduled existing subscriptions");
        Ok(count)
    }

    /// Cancel every worker without touching the store.
    ///
    /// Persisted subscriptions resume on the next `reschedule_existing`.
    pub async fn shutdown(&self) {
        let mut registry = self.inner.registry.lock().await;
        let count = registry.workers.len();
        for (_, handle) in registry.workers.drain() {
            handle.cancel();
        }
        info!(count, "scheduler stopped all workers");
    }

    /// Number of registered workers.
    pub async fn active_count(&self) -> usize {
        self.inner.registry.lock().await.workers.len()
    }

    /// Whether a worker is registered for the subscriber.
    pub async fn is_active(&self, subscriber_id: SubscriberId) -> bool {
        self.inner
            .registry
            .lock()
            .await
            .workers
            .contains_key(&subscriber_id)
    }

    /// Spawn a worker task and return its registry handle.
    ///
    /// Called with the registry lock held; the task itself never takes it
    /// until it exits.
    fn spawn_worker(
        &self,
        registry: &mut Registry,
        subscription: Subscription,
        initial_delay: Duration,
        callback: Arc<dyn DeliveryCallback>,
    ) -> WorkerHandle {
        let generation = registry.next_generation;
        registry.next_generation += 1;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let worker = DeliveryWorker::new(
            &subscription,
            initial_delay,
            self.inner.config.max_failures,
            self.inner.config.dedup_capacity,
            callback,
            cancel_rx,
        );

        let core = self.clone();
        let subscriber_id = subscription.subscriber_id;
        tokio::spawn(async move {
            if worker.run().await == WorkerExit::Evicted {
                core.evict(subscriber_id, generation).await;
            }
        });

        WorkerHandle {
            subscription,
            generation,
            cancel: cancel_tx,
        }
    }

    /// Remove a subscription whose worker gave up.
    ///
    /// Only the worker that is still registered under `generation` may evict;
    /// a replaced worker must not remove its successor.
    async fn evict(&self, subscriber_id: SubscriberId, generation: u64) {
        let mut registry = self.inner.registry.lock().await;

        match registry.workers.get(&subscriber_id) {
            Some(handle) if handle.generation == generation => {}
            _ => {
                debug!(subscriber_id, generation, "stale eviction ignored");
                return;
            }
        }

        if let Err(e) = self.inner.store.delete(subscriber_id).await {
            error!(subscriber_id, error = %e, "can not auto-delete subscription");
        }

        // The worker is gone either way; keep the registry honest.
        registry.workers.remove(&subscriber_id);
        info!(subscriber_id, "subscription auto-deleted after repeated failures");
    }
}
