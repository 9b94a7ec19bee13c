// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Routing contract between the dispatcher and the subscription table.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::protocol::NotificationBatch;
use crate::subscription::{ClientHandle, HandlerResult, SubscriptionId};

use super::{DispatchObserver, DispatchStats, DropReason, FaultKind, HandlerFault};

/// Resolves a batch to its subscription and invokes the handler.
///
/// Implemented by the subscription table of a
/// [`SubscriptionManager`](crate::subscription::SubscriptionManager).
pub trait NotificationRouter: Send + Sync {
    /// Delivers one batch.
    ///
    /// Must not fail: every anomaly (unknown subscription, stale sequence
    /// number, unregistered handle, handler fault) is reported through `ctx`.
    fn route_notification(&self, batch: &NotificationBatch, ctx: &DeliveryContext);
}

/// Observer plus counters, handed to the router for each batch.
#[derive(Clone)]
pub struct DeliveryContext {
    observer: Arc<dyn DispatchObserver>,
    stats: Arc<DispatchStats>,
}

impl DeliveryContext {
    /// Creates a context.
    #[must_use]
    pub fn new(observer: Arc<dyn DispatchObserver>, stats: Arc<DispatchStats>) -> Self {
        Self { observer, stats }
    }

    /// Returns the counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Records a delivered batch.
    pub fn delivered(&self, subscription: SubscriptionId, sequence: u32, entries: usize) {
        self.stats.record_batch_delivered();
        self.observer.batch_delivered(subscription, sequence, entries);
    }

    /// Records a keep-alive.
    pub fn keep_alive(&self, subscription: SubscriptionId, sequence: u32) {
        self.stats.record_keep_alive();
        self.observer.keep_alive(subscription, sequence);
    }

    /// Records a dropped batch.
    pub fn dropped(&self, subscription: SubscriptionId, sequence: u32, reason: DropReason) {
        match reason {
            DropReason::UnknownSubscription => self.stats.record_unknown_subscription(),
            DropReason::Stale => self.stats.record_stale(),
            DropReason::QueueFull => self.stats.record_overflow(),
        }
        self.observer.batch_dropped(subscription, sequence, reason);
    }

    /// Records a sequence gap.
    pub fn gap(&self, subscription: SubscriptionId, last: u32, received: u32, missing: u32) {
        self.stats.record_gap();
        self.observer.sequence_gap(subscription, last, received, missing);
    }

    /// Records an entry skipped for an unregistered handle.
    pub fn skipped(&self, subscription: SubscriptionId, handle: ClientHandle) {
        self.stats.record_skipped_item();
        self.observer.item_skipped(subscription, handle);
    }

    /// Records a successful data change callback.
    pub fn data_change_delivered(&self) {
        self.stats.record_data_change();
    }

    /// Records a successful event callback.
    pub fn event_delivered(&self) {
        self.stats.record_event();
    }

    /// Records a handler fault.
    pub fn fault(&self, fault: &HandlerFault) {
        match fault.kind {
            FaultKind::Error(_) => self.stats.record_handler_error(),
            FaultKind::Panic(_) => self.stats.record_handler_panic(),
        }
        self.observer.handler_fault(fault);
    }
}

/// Runs a handler callback, turning errors and panics into a [`FaultKind`].
pub(crate) fn invoke_guarded<F>(callback: F) -> Result<(), FaultKind>
where
    F: FnOnce() -> HandlerResult,
{
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(FaultKind::Error(e.to_string())),
        Err(payload) => Err(FaultKind::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_call_passes_success_through() {
        assert_eq!(invoke_guarded(|| Ok(())), Ok(()));
    }

    #[test]
    fn guarded_call_captures_error() {
        let result = invoke_guarded(|| Err("bad value".into()));
        assert_eq!(result, Err(FaultKind::Error("bad value".to_string())));
    }

    #[test]
    fn guarded_call_captures_panic() {
        let result = invoke_guarded(|| panic!("handler exploded"));
        assert_eq!(result, Err(FaultKind::Panic("handler exploded".to_string())));

        let code = 7;
        let result = invoke_guarded(|| panic!("code {code}"));
        assert_eq!(result, Err(FaultKind::Panic("code 7".to_string())));
    }

    #[test]
    fn context_counts_by_reason() {
        let stats = Arc::new(DispatchStats::new());
        let ctx = DeliveryContext::new(Arc::new(crate::dispatch::TracingObserver::new()), Arc::clone(&stats));
        ctx.dropped(SubscriptionId::new(1), 3, DropReason::Stale);
        ctx.dropped(SubscriptionId::new(9), 1, DropReason::UnknownSubscription);
        ctx.skipped(SubscriptionId::new(1), ClientHandle::new(4));

        let snap = stats.snapshot();
        assert_eq!(snap.dropped_stale, 1);
        assert_eq!(snap.dropped_unknown_subscription, 1);
        assert_eq!(snap.skipped_unknown_handles, 1);
    }
}
