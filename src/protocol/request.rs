// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed request and response payloads exchanged with the transport.

use std::time::Duration;

use crate::browse::{BrowseEntry, BrowseFilter};
use crate::error::ProtocolError;
use crate::subscription::{
    ClientHandle, ItemFilter, MonitoredItemId, MonitoredTarget, RevisedSettings,
    SubscriptionId, SubscriptionSettings,
};
use crate::types::{AttributeId, DataValue, NodeRef, Variant};

/// A request sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Create a subscription with the requested settings.
    CreateSubscription(SubscriptionSettings),
    /// Change the settings of an existing subscription.
    ModifySubscription {
        /// Target subscription.
        subscription_id: SubscriptionId,
        /// New requested settings.
        settings: SubscriptionSettings,
    },
    /// Enable or disable publishing.
    SetPublishingMode {
        /// Target subscription.
        subscription_id: SubscriptionId,
        /// Whether the server should publish notifications.
        enabled: bool,
    },
    /// Delete a subscription and, implicitly, all its monitored items.
    DeleteSubscription {
        /// Target subscription.
        subscription_id: SubscriptionId,
    },
    /// Create one monitored item.
    CreateMonitoredItem(CreateMonitoredItem),
    /// Delete one monitored item.
    DeleteMonitoredItem {
        /// Owning subscription.
        subscription_id: SubscriptionId,
        /// Server id of the item.
        monitored_item_id: MonitoredItemId,
    },
    /// Read one attribute.
    Read {
        /// Node to read.
        node: NodeRef,
        /// Attribute to read.
        attribute: AttributeId,
    },
    /// Write one attribute.
    Write {
        /// Node to write.
        node: NodeRef,
        /// Attribute to write.
        attribute: AttributeId,
        /// New value.
        value: Variant,
    },
    /// List the children of a node.
    Browse {
        /// Parent node.
        node: NodeRef,
        /// Child filter.
        filter: BrowseFilter,
    },
    /// Invoke a method.
    Call {
        /// Object owning the method.
        object: NodeRef,
        /// The method node.
        method: NodeRef,
        /// Input arguments.
        arguments: Vec<Variant>,
    },
}

impl Request {
    /// Returns a short name of the request kind for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CreateSubscription(_) => "CreateSubscription",
            Self::ModifySubscription { .. } => "ModifySubscription",
            Self::SetPublishingMode { .. } => "SetPublishingMode",
            Self::DeleteSubscription { .. } => "DeleteSubscription",
            Self::CreateMonitoredItem(_) => "CreateMonitoredItem",
            Self::DeleteMonitoredItem { .. } => "DeleteMonitoredItem",
            Self::Read { .. } => "Read",
            Self::Write { .. } => "Write",
            Self::Browse { .. } => "Browse",
            Self::Call { .. } => "Call",
        }
    }
}

/// Parameters of a monitored item creation.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateMonitoredItem {
    /// Owning subscription.
    pub subscription_id: SubscriptionId,
    /// Client handle the server echoes back in notifications.
    pub client_handle: ClientHandle,
    /// What to monitor.
    pub target: MonitoredTarget,
    /// Requested sampling interval.
    pub sampling_interval: Duration,
    /// Requested server-side queue size.
    pub queue_size: u32,
    /// Whether the server discards the oldest value when its queue overflows.
    pub discard_oldest: bool,
    /// Data change or event filter.
    pub filter: ItemFilter,
}

/// A response returned by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// A subscription was created.
    SubscriptionCreated(SubscriptionCreated),
    /// A subscription was modified; carries the revised settings.
    SubscriptionModified(RevisedSettings),
    /// The publishing mode was changed.
    PublishingModeSet,
    /// A subscription was deleted.
    SubscriptionDeleted,
    /// A monitored item was created.
    MonitoredItemCreated(MonitoredItemCreated),
    /// A monitored item was deleted.
    MonitoredItemDeleted,
    /// The value of a read.
    Value(DataValue),
    /// A write succeeded.
    Written,
    /// Children returned by a browse.
    Browsed(Vec<BrowseEntry>),
    /// Output arguments of a method call.
    Called(Vec<Variant>),
}

impl Response {
    /// Returns a short name of the response kind for logs and errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SubscriptionCreated(_) => "SubscriptionCreated",
            Self::SubscriptionModified(_) => "SubscriptionModified",
            Self::PublishingModeSet => "PublishingModeSet",
            Self::SubscriptionDeleted => "SubscriptionDeleted",
            Self::MonitoredItemCreated(_) => "MonitoredItemCreated",
            Self::MonitoredItemDeleted => "MonitoredItemDeleted",
            Self::Value(_) => "Value",
            Self::Written => "Written",
            Self::Browsed(_) => "Browsed",
            Self::Called(_) => "Called",
        }
    }

    /// Builds the error for a response that does not match its request.
    #[must_use]
    pub fn unexpected(&self, expected: &'static str) -> ProtocolError {
        ProtocolError::UnexpectedResponse {
            expected,
            actual: self.kind(),
        }
    }
}

/// Result of a successful subscription creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionCreated {
    /// Server-assigned subscription id.
    pub subscription_id: SubscriptionId,
    /// Settings as revised by the server.
    pub revised: RevisedSettings,
}

/// Result of a successful monitored item creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitoredItemCreated {
    /// Server-assigned item id.
    pub monitored_item_id: MonitoredItemId,
    /// Sampling interval as revised by the server.
    pub revised_sampling_interval: Duration,
    /// Queue size as revised by the server.
    pub revised_queue_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_response_names_both_kinds() {
        let err = Response::Written.unexpected("Value");
        assert_eq!(err.to_string(), "expected Value response, got Written");
    }

    #[test]
    fn request_kind() {
        let req = Request::Read {
            node: NodeRef::objects(),
            attribute: AttributeId::Value,
        };
        assert_eq!(req.kind(), "Read");
    }
}
