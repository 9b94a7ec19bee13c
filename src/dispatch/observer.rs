// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Observability hooks of the delivery path.

use std::fmt;

use crate::subscription::{ClientHandle, SubscriptionId};
use crate::types::SessionId;

/// Why a batch was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// No live subscription has the batch's id (typically deleted while the
    /// batch was queued).
    UnknownSubscription,
    /// The sequence number was already delivered or is older than the last
    /// delivered one.
    Stale,
    /// The queue was full and the overflow policy drops new batches.
    QueueFull,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSubscription => write!(f, "unknown subscription"),
            Self::Stale => write!(f, "stale sequence number"),
            Self::QueueFull => write!(f, "queue full"),
        }
    }
}

/// Which handler callback faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    /// [`Handler::on_data_change`](crate::subscription::Handler::on_data_change).
    DataChange,
    /// [`Handler::on_event`](crate::subscription::Handler::on_event).
    Event,
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataChange => write!(f, "on_data_change"),
            Self::Event => write!(f, "on_event"),
        }
    }
}

/// How a handler callback faulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// The callback returned an error.
    Error(String),
    /// The callback panicked.
    Panic(String),
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(msg) => write!(f, "returned error: {msg}"),
            Self::Panic(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

/// A handler failure caught at the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFault {
    /// Subscription whose handler faulted.
    pub subscription_id: SubscriptionId,
    /// Item the notification was for.
    pub handle: ClientHandle,
    /// Sequence number of the batch.
    pub sequence_number: u32,
    /// Faulting callback.
    pub callback: Callback,
    /// Error or panic message.
    pub kind: FaultKind,
}

/// Receives delivery-path events.
///
/// Nothing that happens while notifications are being delivered is ever
/// returned to a caller; it is reported here instead. All methods have empty
/// default bodies so an observer only overrides what it cares about.
///
/// Methods are called on the dispatcher thread, except
/// [`batch_dropped`](Self::batch_dropped) with [`DropReason::QueueFull`],
/// which runs on the producer side.
pub trait DispatchObserver: Send + Sync {
    /// A batch was routed and its entries handed to the handler.
    fn batch_delivered(&self, subscription: SubscriptionId, sequence: u32, entries: usize) {
        let _ = (subscription, sequence, entries);
    }

    /// A keep-alive arrived.
    fn keep_alive(&self, subscription: SubscriptionId, sequence: u32) {
        let _ = (subscription, sequence);
    }

    /// A batch was dropped without invoking any handler.
    fn batch_dropped(&self, subscription: SubscriptionId, sequence: u32, reason: DropReason) {
        let _ = (subscription, sequence, reason);
    }

    /// Sequence numbers were skipped; the batch is still delivered.
    fn sequence_gap(&self, subscription: SubscriptionId, last: u32, received: u32, missing: u32) {
        let _ = (subscription, last, received, missing);
    }

    /// An entry referenced a handle that is not registered.
    fn item_skipped(&self, subscription: SubscriptionId, handle: ClientHandle) {
        let _ = (subscription, handle);
    }

    /// A handler returned an error or panicked.
    fn handler_fault(&self, fault: &HandlerFault) {
        let _ = fault;
    }
}

/// Observer that writes every delivery event to `tracing`.
///
/// This is the default observer of a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver {
    session: Option<SessionId>,
}

impl TracingObserver {
    /// Creates an observer without session context.
    #[must_use]
    pub const fn new() -> Self {
        Self { session: None }
    }

    /// Creates an observer that tags every record with a session id.
    #[must_use]
    pub const fn for_session(session: SessionId) -> Self {
        Self {
            session: Some(session),
        }
    }
}

impl DispatchObserver for TracingObserver {
    fn batch_delivered(&self, subscription: SubscriptionId, sequence: u32, entries: usize) {
        tracing::trace!(
            session = ?self.session,
            subscription = %subscription,
            sequence,
            entries,
            "Delivered notification batch"
        );
    }

    fn keep_alive(&self, subscription: SubscriptionId, sequence: u32) {
        tracing::trace!(session = ?self.session, subscription = %subscription, sequence, "Keep-alive");
    }

    fn batch_dropped(&self, subscription: SubscriptionId, sequence: u32, reason: DropReason) {
        match reason {
            DropReason::QueueFull => tracing::warn!(
                session = ?self.session,
                subscription = %subscription,
                sequence,
                "Dropped notification batch: {reason}"
            ),
            DropReason::UnknownSubscription | DropReason::Stale => tracing::debug!(
                session = ?self.session,
                subscription = %subscription,
                sequence,
                "Dropped notification batch: {reason}"
            ),
        }
    }

    fn sequence_gap(&self, subscription: SubscriptionId, last: u32, received: u32, missing: u32) {
        tracing::warn!(
            session = ?self.session,
            subscription = %subscription,
            last,
            received,
            missing,
            "Sequence gap in notifications"
        );
    }

    fn item_skipped(&self, subscription: SubscriptionId, handle: ClientHandle) {
        tracing::debug!(
            session = ?self.session,
            subscription = %subscription,
            handle = %handle,
            "Skipped notification for unregistered handle"
        );
    }

    fn handler_fault(&self, fault: &HandlerFault) {
        tracing::error!(
            session = ?self.session,
            subscription = %fault.subscription_id,
            handle = %fault.handle,
            sequence = fault.sequence_number,
            callback = %fault.callback,
            "Handler {}",
            fault.kind
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_kind_display() {
        assert_eq!(
            FaultKind::Error("boom".to_string()).to_string(),
            "returned error: boom"
        );
        assert_eq!(FaultKind::Panic("oops".to_string()).to_string(), "panicked: oops");
        assert_eq!(Callback::Event.to_string(), "on_event");
    }

    #[test]
    fn default_methods_are_no_ops() {
        struct Silent;
        impl DispatchObserver for Silent {}

        let observer = Silent;
        observer.batch_dropped(SubscriptionId::new(1), 1, DropReason::Stale);
        observer.item_skipped(SubscriptionId::new(1), ClientHandle::new(1));
    }
}
