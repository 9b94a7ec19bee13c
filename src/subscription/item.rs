// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Monitored items and their creation options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_ms;
use crate::types::{AttributeId, NodeRef};

use super::{ClientHandle, DataChangeFilter, ItemFilter, MonitoredItemId};

/// What a monitored item watches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MonitoredTarget {
    /// Changes of one attribute of a node.
    DataChange {
        /// Sampled node.
        node: NodeRef,
        /// Sampled attribute, usually `Value`.
        attribute: AttributeId,
    },
    /// Events raised by a notifier.
    Events {
        /// Event source node.
        notifier: NodeRef,
    },
}

impl MonitoredTarget {
    /// Returns the node the item references.
    #[must_use]
    pub fn node(&self) -> &NodeRef {
        match self {
            Self::DataChange { node, .. } => node,
            Self::Events { notifier } => notifier,
        }
    }

    /// Returns the attribute the server samples.
    ///
    /// Event items target the `EventNotifier` attribute of their notifier.
    #[must_use]
    pub fn attribute(&self) -> AttributeId {
        match self {
            Self::DataChange { attribute, .. } => *attribute,
            Self::Events { .. } => AttributeId::EventNotifier,
        }
    }

    /// Returns `true` for event targets.
    #[must_use]
    pub fn is_events(&self) -> bool {
        matches!(self, Self::Events { .. })
    }
}

/// Options of a data change monitored item.
///
/// Defaults come from the session configuration; see
/// [`MonitoringDefaults`](crate::config::MonitoringDefaults).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringOptions {
    /// Sampled attribute.
    pub attribute: AttributeId,
    /// Requested sampling interval.
    #[serde(with = "duration_ms")]
    pub sampling_interval: Duration,
    /// Requested server-side queue size.
    pub queue_size: u32,
    /// Whether the server discards the oldest value when its queue overflows.
    pub discard_oldest: bool,
    /// Data change filter.
    pub filter: DataChangeFilter,
}

impl MonitoringOptions {
    /// Sets the sampled attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeId) -> Self {
        self.attribute = attribute;
        self
    }

    /// Sets the sampling interval.
    #[must_use]
    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    /// Sets the queue size.
    #[must_use]
    pub fn with_queue_size(mut self, size: u32) -> Self {
        self.queue_size = size;
        self
    }

    /// Sets the data change filter.
    #[must_use]
    pub fn with_filter(mut self, filter: DataChangeFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl Default for MonitoringOptions {
    fn default() -> Self {
        Self {
            attribute: AttributeId::Value,
            sampling_interval: Duration::ZERO,
            queue_size: 1,
            discard_oldest: true,
            filter: DataChangeFilter::default(),
        }
    }
}

/// A monitored item registered on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItem {
    /// Client-assigned handle, echoed in notifications.
    pub handle: ClientHandle,
    /// Server-assigned id, used to delete the item.
    pub server_id: MonitoredItemId,
    /// What the item watches.
    pub target: MonitoredTarget,
    /// Sampling interval revised by the server.
    pub sampling_interval: Duration,
    /// Queue size revised by the server.
    pub queue_size: u32,
    /// Filter attached to the item.
    pub filter: ItemFilter,
}

impl MonitoredItem {
    /// Returns the node the item references.
    #[must_use]
    pub fn node(&self) -> &NodeRef {
        self.target.node()
    }

    /// Returns `true` if this item delivers events.
    #[must_use]
    pub fn is_event_item(&self) -> bool {
        self.target.is_events()
    }
}
