// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Caller-supplied notification handler.

use chrono::{DateTime, Utc};

use crate::types::{AttributeId, NodeRef, QualifiedName, StatusCode, Variant};

use super::{ClientHandle, SubscriptionId};

/// Error a handler may report back to the dispatcher.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of [`Handler`] callbacks.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Receives the notifications of one subscription.
///
/// Callbacks run on the notification dispatcher thread, one at a time, in
/// delivery order. They are never called concurrently for the same
/// subscription. A callback that returns an error or panics is reported to
/// the [`DispatchObserver`](crate::dispatch::DispatchObserver) and delivery
/// goes on with the next entry.
///
/// Callbacks should return quickly; a slow callback delays every later
/// notification of the session.
///
/// # Examples
///
/// ```
/// use uasub_lib::subscription::{DataChangeMeta, EventNotification, Handler, HandlerResult};
/// use uasub_lib::types::{NodeRef, Variant};
///
/// struct Printer;
///
/// impl Handler for Printer {
///     fn on_data_change(&self, node: &NodeRef, value: &Variant, _meta: &DataChangeMeta) -> HandlerResult {
///         println!("{node} = {value:?}");
///         Ok(())
///     }
///
///     fn on_event(&self, event: &EventNotification) -> HandlerResult {
///         println!("event: {:?}", event.get("Message"));
///         Ok(())
///     }
/// }
/// ```
pub trait Handler: Send + Sync {
    /// Called for each data change entry.
    ///
    /// # Errors
    ///
    /// An error is logged with the subscription id and handle; it does not
    /// stop delivery.
    fn on_data_change(&self, node: &NodeRef, value: &Variant, meta: &DataChangeMeta)
    -> HandlerResult;

    /// Called for each event entry.
    ///
    /// # Errors
    ///
    /// An error is logged with the subscription id and handle; it does not
    /// stop delivery.
    fn on_event(&self, event: &EventNotification) -> HandlerResult;
}

/// Context of a data change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChangeMeta {
    /// Subscription that delivered the value.
    pub subscription_id: SubscriptionId,
    /// Handle of the monitored item.
    pub handle: ClientHandle,
    /// Sampled attribute.
    pub attribute: AttributeId,
    /// Quality of the value.
    pub status: StatusCode,
    /// When the source produced the value.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// When the server produced or received the value.
    pub server_timestamp: Option<DateTime<Utc>>,
    /// Sequence number of the batch.
    pub sequence_number: u32,
}

/// An event delivered to a handler.
///
/// Field values are paired with the select clauses of the item's event filter.
#[derive(Debug, Clone, PartialEq)]
pub struct EventNotification {
    /// Subscription that delivered the event.
    pub subscription_id: SubscriptionId,
    /// Handle of the event item.
    pub handle: ClientHandle,
    /// Event source the item watches.
    pub notifier: NodeRef,
    /// Sequence number of the batch.
    pub sequence_number: u32,
    names: Vec<QualifiedName>,
    fields: Vec<Variant>,
}

impl EventNotification {
    /// Builds a notification from select clauses and field values.
    #[must_use]
    pub fn new(
        subscription_id: SubscriptionId,
        handle: ClientHandle,
        notifier: NodeRef,
        sequence_number: u32,
        names: Vec<QualifiedName>,
        fields: Vec<Variant>,
    ) -> Self {
        Self {
            subscription_id,
            handle,
            notifier,
            sequence_number,
            names,
            fields,
        }
    }

    /// Returns the field values in select-clause order.
    #[must_use]
    pub fn fields(&self) -> &[Variant] {
        &self.fields
    }

    /// Returns the select clauses the fields answer.
    #[must_use]
    pub fn field_names(&self) -> &[QualifiedName] {
        &self.names
    }

    /// Returns the value of the field with the given browse name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Variant> {
        self.names
            .iter()
            .position(|n| n.name() == name)
            .and_then(|idx| self.fields.get(idx))
    }

    /// Iterates over `(name, value)` pairs.
    ///
    /// Fields without a matching clause are left out.
    pub fn iter(&self) -> impl Iterator<Item = (&QualifiedName, &Variant)> {
        self.names.iter().zip(&self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> EventNotification {
        EventNotification::new(
            SubscriptionId::new(1),
            ClientHandle::new(2),
            NodeRef::server(),
            7,
            vec![QualifiedName::new(0, "Message"), QualifiedName::new(0, "Severity")],
            vec![Variant::from("overheat"), Variant::from(500_u16)],
        )
    }

    #[test]
    fn field_lookup_by_name() {
        let event = sample_event();
        assert_eq!(event.get("Message").and_then(Variant::as_str), Some("overheat"));
        assert_eq!(event.get("Severity").and_then(Variant::as_i64), Some(500));
        assert!(event.get("SourceName").is_none());
    }

    #[test]
    fn iter_pairs_names_with_values() {
        let event = sample_event();
        let names: Vec<&str> = event.iter().map(|(n, _)| n.name()).collect();
        assert_eq!(names, ["Message", "Severity"]);
        assert_eq!(event.fields().len(), 2);
    }
}
