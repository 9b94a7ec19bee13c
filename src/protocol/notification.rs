// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Notification batches pushed by the server.

use crate::subscription::{ClientHandle, SubscriptionId};
use crate::types::{DataValue, Variant};

/// One delivery unit for a subscription.
///
/// A batch with no entries is a keep-alive: it tells the client the
/// subscription is alive and carries the *next* sequence number without
/// consuming it.
///
/// # Examples
///
/// ```
/// use uasub_lib::protocol::NotificationBatch;
/// use uasub_lib::subscription::{ClientHandle, SubscriptionId};
/// use uasub_lib::types::DataValue;
///
/// let batch = NotificationBatch::new(SubscriptionId::new(1), 1)
///     .with_data_change(ClientHandle::new(1), DataValue::new(42_i32));
/// assert_eq!(batch.len(), 1);
/// assert!(!batch.is_keep_alive());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationBatch {
    /// Routing key: the server-assigned subscription id.
    pub subscription_id: SubscriptionId,
    /// Per-subscription sequence number.
    pub sequence_number: u32,
    /// Data change entries, in server order.
    pub data_changes: Vec<DataChangeEntry>,
    /// Event entries, in server order.
    pub events: Vec<EventEntry>,
}

impl NotificationBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new(subscription_id: SubscriptionId, sequence_number: u32) -> Self {
        Self {
            subscription_id,
            sequence_number,
            data_changes: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Appends a data change entry.
    #[must_use]
    pub fn with_data_change(mut self, handle: ClientHandle, value: DataValue) -> Self {
        self.data_changes.push(DataChangeEntry { handle, value });
        self
    }

    /// Appends an event entry.
    #[must_use]
    pub fn with_event(mut self, handle: ClientHandle, fields: Vec<Variant>) -> Self {
        self.events.push(EventEntry { handle, fields });
        self
    }

    /// Returns the total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data_changes.len() + self.events.len()
    }

    /// Returns `true` if the batch carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if this is a keep-alive.
    #[must_use]
    pub fn is_keep_alive(&self) -> bool {
        self.is_empty()
    }
}

/// A sampled value for one monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChangeEntry {
    /// Client handle of the monitored item.
    pub handle: ClientHandle,
    /// The new value with status and timestamps.
    pub value: DataValue,
}

/// An event reported by one event monitored item.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEntry {
    /// Client handle of the monitored item.
    pub handle: ClientHandle,
    /// Event field values, in the order of the item's select clauses.
    pub fields: Vec<Variant>,
}
