// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters of the delivery path.
///
/// Updated by the dispatcher thread and by producers; read with
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct DispatchStats {
    batches_delivered: AtomicU64,
    data_changes_delivered: AtomicU64,
    events_delivered: AtomicU64,
    keep_alives: AtomicU64,
    dropped_unknown_subscription: AtomicU64,
    dropped_stale: AtomicU64,
    dropped_overflow: AtomicU64,
    sequence_gaps: AtomicU64,
    skipped_unknown_handles: AtomicU64,
    handler_errors: AtomicU64,
    handler_panics: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DispatchStatsSnapshot {
    /// Batches routed to a live subscription.
    pub batches_delivered: u64,
    /// Data change callbacks that completed without fault.
    pub data_changes_delivered: u64,
    /// Event callbacks that completed without fault.
    pub events_delivered: u64,
    /// Keep-alive batches received.
    pub keep_alives: u64,
    /// Batches dropped because their subscription is gone.
    pub dropped_unknown_subscription: u64,
    /// Duplicate or out-of-order batches dropped.
    pub dropped_stale: u64,
    /// Batches dropped by the overflow policy.
    pub dropped_overflow: u64,
    /// Gaps detected in sequence numbers.
    pub sequence_gaps: u64,
    /// Entries skipped because their handle is not registered.
    pub skipped_unknown_handles: u64,
    /// Handler callbacks that returned an error.
    pub handler_errors: u64,
    /// Handler callbacks that panicked.
    pub handler_panics: u64,
}

impl DispatchStatsSnapshot {
    /// Returns the total number of handler faults.
    #[must_use]
    pub const fn handler_faults(&self) -> u64 {
        self.handler_errors + self.handler_panics
    }

    /// Returns the total number of dropped batches.
    #[must_use]
    pub const fn batches_dropped(&self) -> u64 {
        self.dropped_unknown_subscription + self.dropped_stale + self.dropped_overflow
    }
}

macro_rules! counters {
    ($($field:ident => $incr:ident),* $(,)?) => {
        impl DispatchStats {
            $(
                pub(crate) fn $incr(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*

            /// Copies the current counter values.
            #[must_use]
            pub fn snapshot(&self) -> DispatchStatsSnapshot {
                DispatchStatsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters! {
    batches_delivered => record_batch_delivered,
    data_changes_delivered => record_data_change,
    events_delivered => record_event,
    keep_alives => record_keep_alive,
    dropped_unknown_subscription => record_unknown_subscription,
    dropped_stale => record_stale,
    dropped_overflow => record_overflow,
    sequence_gaps => record_gap,
    skipped_unknown_handles => record_skipped_item,
    handler_errors => record_handler_error,
    handler_panics => record_handler_panic,
}

impl DispatchStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
