// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handler that records its callbacks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::subscription::{DataChangeMeta, EventNotification, Handler, HandlerResult};
use crate::types::{NodeRef, Variant};

/// One recorded callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    /// A data change callback.
    DataChange {
        /// The monitored node.
        node: NodeRef,
        /// The delivered value.
        value: Variant,
        /// Delivery metadata.
        meta: DataChangeMeta,
    },
    /// An event callback.
    Event(EventNotification),
}

#[derive(Default)]
struct RecordingInner {
    calls: Mutex<Vec<Recorded>>,
    recorded: Notify,
    fail_data_changes: AtomicUsize,
    fail_events: AtomicUsize,
    panic_data_changes: AtomicUsize,
    panic_events: AtomicUsize,
}

/// A [`Handler`] that keeps every successful callback in order.
///
/// Calls that were told to fail or panic are not recorded. Cloning is cheap;
/// clones share the same record.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    inner: Arc<RecordingInner>,
}

impl RecordingHandler {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Fault Injection ==========

    /// Makes the next `count` data change callbacks return an error.
    pub fn fail_next_data_changes(&self, count: usize) {
        self.inner.fail_data_changes.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` event callbacks return an error.
    pub fn fail_next_events(&self, count: usize) {
        self.inner.fail_events.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` data change callbacks panic.
    pub fn panic_next_data_changes(&self, count: usize) {
        self.inner.panic_data_changes.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` event callbacks panic.
    pub fn panic_next_events(&self, count: usize) {
        self.inner.panic_events.store(count, Ordering::SeqCst);
    }

    // ========== Inspection ==========

    /// Returns every recorded callback in delivery order.
    #[must_use]
    pub fn calls(&self) -> Vec<Recorded> {
        self.inner.calls.lock().clone()
    }

    /// Returns the recorded data changes as `(node, value, meta)`.
    #[must_use]
    pub fn data_changes(&self) -> Vec<(NodeRef, Variant, DataChangeMeta)> {
        self.inner
            .calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Recorded::DataChange { node, value, meta } => {
                    Some((node.clone(), value.clone(), meta.clone()))
                }
                Recorded::Event(_) => None,
            })
            .collect()
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<EventNotification> {
        self.inner
            .calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Recorded::Event(event) => Some(event.clone()),
                Recorded::DataChange { .. } => None,
            })
            .collect()
    }

    /// Returns the number of recorded data changes.
    #[must_use]
    pub fn data_change_count(&self) -> usize {
        self.data_changes().len()
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events().len()
    }

    /// Returns the number of recorded callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.calls.lock().len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every recorded callback.
    pub fn clear(&self) {
        self.inner.calls.lock().clear();
    }

    /// Waits until at least `count` callbacks are recorded.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let recorded = self.inner.recorded.notified();
                if self.len() >= count {
                    return;
                }
                recorded.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn record(&self, call: Recorded) {
        self.inner.calls.lock().push(call);
        self.inner.recorded.notify_waiters();
    }
}

/// Consumes one pending injection, if any.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl Handler for RecordingHandler {
    fn on_data_change(&self, node: &NodeRef, value: &Variant, meta: &DataChangeMeta) -> HandlerResult {
        if take_one(&self.inner.panic_data_changes) {
            panic!("injected data change panic for {node}");
        }
        if take_one(&self.inner.fail_data_changes) {
            return Err(format!("injected data change failure for {node}").into());
        }
        self.record(Recorded::DataChange {
            node: node.clone(),
            value: value.clone(),
            meta: meta.clone(),
        });
        Ok(())
    }

    fn on_event(&self, event: &EventNotification) -> HandlerResult {
        if take_one(&self.inner.panic_events) {
            panic!("injected event panic for {}", event.notifier);
        }
        if take_one(&self.inner.fail_events) {
            return Err(format!("injected event failure for {}", event.notifier).into());
        }
        self.record(Recorded::Event(event.clone()));
        Ok(())
    }
}

impl std::fmt::Debug for RecordingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingHandler")
            .field("calls", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{ClientHandle, SubscriptionId};
    use crate::types::{AttributeId, StatusCode};

    fn meta(handle: u32) -> DataChangeMeta {
        DataChangeMeta {
            subscription_id: SubscriptionId::new(1),
            handle: ClientHandle::new(handle),
            attribute: AttributeId::Value,
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: None,
            sequence_number: 1,
        }
    }

    #[test]
    fn failures_are_not_recorded() {
        let handler = RecordingHandler::new();
        handler.fail_next_data_changes(1);

        let node = NodeRef::numeric(2, 2);
        assert!(handler.on_data_change(&node, &Variant::from(1_i32), &meta(1)).is_err());
        assert!(handler.on_data_change(&node, &Variant::from(2_i32), &meta(1)).is_ok());

        let recorded = handler.data_changes();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].1, Variant::from(2_i32));
    }

    #[test]
    #[should_panic(expected = "injected data change panic")]
    fn panic_injection() {
        let handler = RecordingHandler::new();
        handler.panic_next_data_changes(1);
        let _ = handler.on_data_change(&NodeRef::numeric(2, 2), &Variant::Empty, &meta(1));
    }

    #[tokio::test]
    async fn wait_for_calls_times_out() {
        let handler = RecordingHandler::new();
        assert!(!handler.wait_for_calls(1, Duration::from_millis(10)).await);

        let _ = handler.on_data_change(&NodeRef::numeric(2, 2), &Variant::Empty, &meta(1));
        assert!(handler.wait_for_calls(1, Duration::from_millis(10)).await);
    }
}
