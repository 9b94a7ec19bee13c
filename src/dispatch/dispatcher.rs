// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded queue plus dedicated delivery thread.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::config::DispatchConfig;
use crate::error::{Error, Result};
use crate::protocol::NotificationBatch;

use super::{
    DeliveryContext, DispatchObserver, DispatchStats, DispatchStatsSnapshot, DropReason,
    NotificationRouter,
};

/// What [`NotificationDispatcher::submit`] does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for room (backpressure on the producer).
    #[default]
    Block,
    /// Drop the new batch, report it and fail with [`Error::QueueFull`].
    ///
    /// A [`Session`](crate::Session) pump has nowhere to return the error to,
    /// so it moves on to the next batch. Behind a session this drops the same
    /// batches as [`DropNewest`](Self::DropNewest); the difference only shows
    /// to callers of [`NotificationDispatcher::submit`].
    Reject,
    /// Drop the new batch and report it; the submission succeeds.
    DropNewest,
}

enum DispatchMessage {
    Batch(NotificationBatch),
    Flush(oneshot::Sender<()>),
}

/// Delivers notification batches on a dedicated thread.
///
/// Batches are accepted into a bounded queue and delivered strictly in
/// arrival order, one at a time, across all subscriptions. The thread never
/// touches the transport, so a slow or faulting handler cannot stall request
/// and response traffic.
///
/// Dropping the dispatcher closes the queue; the thread finishes the batches
/// already queued and exits. Use [`shutdown`](Self::shutdown) to wait for it.
pub struct NotificationDispatcher {
    sender: Mutex<Option<mpsc::Sender<DispatchMessage>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    policy: OverflowPolicy,
    ctx: DeliveryContext,
}

impl NotificationDispatcher {
    /// Name of the delivery thread.
    pub const THREAD_NAME: &'static str = "uasub-dispatch";

    /// Starts the delivery thread.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero queue capacity and
    /// `Error::DispatcherSpawn` if the thread cannot be created.
    pub fn spawn(
        router: Arc<dyn NotificationRouter>,
        config: &DispatchConfig,
        observer: Arc<dyn DispatchObserver>,
    ) -> Result<Self> {
        if config.queue_capacity == 0 {
            return Err(Error::Config("dispatch queue capacity must be > 0".to_string()));
        }

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let ctx = DeliveryContext::new(observer, Arc::new(DispatchStats::new()));
        let worker_ctx = ctx.clone();

        let worker = thread::Builder::new()
            .name(Self::THREAD_NAME.into())
            .spawn(move || run(rx, router.as_ref(), &worker_ctx))
            .map_err(Error::DispatcherSpawn)?;

        tracing::debug!(
            capacity = config.queue_capacity,
            policy = ?config.overflow_policy,
            "Started notification dispatcher"
        );

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            policy: config.overflow_policy,
            ctx,
        })
    }

    /// Queues a batch for delivery.
    ///
    /// With [`OverflowPolicy::Block`] this waits for room in the queue.
    ///
    /// # Errors
    ///
    /// Returns `Error::QueueFull` under [`OverflowPolicy::Reject`] when the
    /// queue is full and `Error::DispatcherStopped` after shutdown.
    pub async fn submit(&self, batch: NotificationBatch) -> Result<()> {
        let sender = self.sender()?;
        match self.policy {
            OverflowPolicy::Block => sender
                .send(DispatchMessage::Batch(batch))
                .await
                .map_err(|_| Error::DispatcherStopped),
            OverflowPolicy::Reject => match sender.try_send(DispatchMessage::Batch(batch)) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(message)) => {
                    self.record_overflow(&message);
                    Err(Error::QueueFull)
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::DispatcherStopped),
            },
            OverflowPolicy::DropNewest => match sender.try_send(DispatchMessage::Batch(batch)) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(message)) => {
                    self.record_overflow(&message);
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::DispatcherStopped),
            },
        }
    }

    /// Waits until every batch queued before this call has been delivered.
    ///
    /// # Errors
    ///
    /// Returns `Error::DispatcherStopped` if the thread is gone.
    pub async fn flush(&self) -> Result<()> {
        let sender = self.sender()?;
        let (tx, rx) = oneshot::channel();
        sender
            .send(DispatchMessage::Flush(tx))
            .await
            .map_err(|_| Error::DispatcherStopped)?;
        rx.await.map_err(|_| Error::DispatcherStopped)
    }

    /// Returns the number of queued messages.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map_or(0, |s| s.max_capacity() - s.capacity())
    }

    /// Returns a copy of the delivery counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.ctx.stats().snapshot()
    }

    /// Returns `true` until [`shutdown`](Self::shutdown) is called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Closes the queue and waits for the thread to deliver what is left.
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Error::DispatcherStopped` if the thread terminated abnormally.
    pub async fn shutdown(&self) -> Result<()> {
        drop(self.sender.lock().take());
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        let joined = tokio::task::spawn_blocking(move || worker.join())
            .await
            .map_err(|_| Error::DispatcherStopped)?;
        joined.map_err(|_| Error::DispatcherStopped)?;

        tracing::debug!("Notification dispatcher shut down");
        Ok(())
    }

    fn record_overflow(&self, message: &DispatchMessage) {
        if let DispatchMessage::Batch(batch) = message {
            self.ctx
                .dropped(batch.subscription_id, batch.sequence_number, DropReason::QueueFull);
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<DispatchMessage>> {
        self.sender.lock().clone().ok_or(Error::DispatcherStopped)
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("policy", &self.policy)
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

fn run(
    mut rx: mpsc::Receiver<DispatchMessage>,
    router: &dyn NotificationRouter,
    ctx: &DeliveryContext,
) {
    while let Some(message) = rx.blocking_recv() {
        match message {
            DispatchMessage::Batch(batch) => router.route_notification(&batch, ctx),
            DispatchMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::trace!("Notification queue closed");
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use super::*;
    use crate::dispatch::TracingObserver;
    use crate::subscription::SubscriptionId;

    /// Records the `(subscription, sequence)` of every routed batch.
    #[derive(Default)]
    struct LogRouter {
        seen: Mutex<Vec<(u32, u32)>>,
    }

    impl NotificationRouter for LogRouter {
        fn route_notification(&self, batch: &NotificationBatch, _ctx: &DeliveryContext) {
            self.seen
                .lock()
                .push((batch.subscription_id.value(), batch.sequence_number));
        }
    }

    /// Blocks the delivery thread on a barrier for the first batch.
    struct GateRouter {
        gate: Barrier,
        first: Mutex<bool>,
    }

    impl NotificationRouter for GateRouter {
        fn route_notification(&self, _batch: &NotificationBatch, _ctx: &DeliveryContext) {
            let wait = std::mem::replace(&mut *self.first.lock(), false);
            if wait {
                self.gate.wait();
            }
        }
    }

    fn batch(sub: u32, seq: u32) -> NotificationBatch {
        NotificationBatch::new(SubscriptionId::new(sub), seq)
    }

    fn config(capacity: usize, policy: OverflowPolicy) -> DispatchConfig {
        DispatchConfig {
            queue_capacity: capacity,
            overflow_policy: policy,
        }
    }

    #[tokio::test]
    async fn delivers_in_arrival_order_across_subscriptions() {
        let router = Arc::new(LogRouter::default());
        let dispatcher = NotificationDispatcher::spawn(
            Arc::clone(&router) as Arc<dyn NotificationRouter>,
            &config(16, OverflowPolicy::Block),
            Arc::new(TracingObserver::new()),
        )
        .unwrap();

        for (sub, seq) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
            dispatcher.submit(batch(sub, seq)).await.unwrap();
        }
        dispatcher.flush().await.unwrap();

        assert_eq!(*router.seen.lock(), vec![(1, 1), (2, 1), (1, 2), (2, 2)]);
        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reject_policy_fails_when_full() {
        let router = Arc::new(GateRouter {
            gate: Barrier::new(2),
            first: Mutex::new(true),
        });
        let dispatcher = NotificationDispatcher::spawn(
            Arc::clone(&router) as Arc<dyn NotificationRouter>,
            &config(1, OverflowPolicy::Reject),
            Arc::new(TracingObserver::new()),
        )
        .unwrap();

        // First batch is taken by the thread and parks it on the gate.
        dispatcher.submit(batch(1, 1)).await.unwrap();
        while dispatcher.pending() > 0 {
            tokio::task::yield_now().await;
        }
        dispatcher.submit(batch(1, 2)).await.unwrap();
        assert!(matches!(dispatcher.submit(batch(1, 3)).await, Err(Error::QueueFull)));
        assert_eq!(dispatcher.stats().dropped_overflow, 1);

        router.gate.wait();
        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drop_newest_policy_counts_drops() {
        let router = Arc::new(GateRouter {
            gate: Barrier::new(2),
            first: Mutex::new(true),
        });
        let dispatcher = NotificationDispatcher::spawn(
            Arc::clone(&router) as Arc<dyn NotificationRouter>,
            &config(1, OverflowPolicy::DropNewest),
            Arc::new(TracingObserver::new()),
        )
        .unwrap();

        dispatcher.submit(batch(1, 1)).await.unwrap();
        while dispatcher.pending() > 0 {
            tokio::task::yield_now().await;
        }
        dispatcher.submit(batch(1, 2)).await.unwrap();
        dispatcher.submit(batch(1, 3)).await.unwrap();
        assert_eq!(dispatcher.stats().dropped_overflow, 1);

        router.gate.wait();
        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails() {
        let dispatcher = NotificationDispatcher::spawn(
            Arc::new(LogRouter::default()),
            &config(4, OverflowPolicy::Block),
            Arc::new(TracingObserver::new()),
        )
        .unwrap();

        dispatcher.shutdown().await.unwrap();
        assert!(!dispatcher.is_running());
        assert!(matches!(
            dispatcher.submit(batch(1, 1)).await,
            Err(Error::DispatcherStopped)
        ));
        assert!(matches!(dispatcher.flush().await, Err(Error::DispatcherStopped)));
        dispatcher.shutdown().await.unwrap();
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = NotificationDispatcher::spawn(
            Arc::new(LogRouter::default()),
            &config(0, OverflowPolicy::Block),
            Arc::new(TracingObserver::new()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
