// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Monitored item filters.

use serde::{Deserialize, Serialize};

use crate::types::{NodeRef, QualifiedName};

/// Which changes of a value produce a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataChangeTrigger {
    /// Status code changes only.
    Status,
    /// Status or value changes.
    #[default]
    StatusValue,
    /// Status, value or source timestamp changes.
    StatusValueTimestamp,
}

/// Minimum change of a numeric value before it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Deadband {
    /// Every change is reported.
    #[default]
    None,
    /// Absolute difference from the last reported value.
    Absolute(f64),
    /// Percentage of the item's engineering range.
    Percent(f64),
}

/// Filter of a data change monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DataChangeFilter {
    /// Change trigger.
    pub trigger: DataChangeTrigger,
    /// Deadband applied to numeric values.
    pub deadband: Deadband,
}

impl DataChangeFilter {
    /// Sets the trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: DataChangeTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Sets the deadband.
    #[must_use]
    pub fn with_deadband(mut self, deadband: Deadband) -> Self {
        self.deadband = deadband;
        self
    }
}

/// Filter of an event monitored item.
///
/// The select clauses name the event fields the server returns, in order.
/// Event notifications carry one value per clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    event_type: NodeRef,
    select: Vec<QualifiedName>,
}

impl EventFilter {
    /// Fields selected by [`EventFilter::base_event`].
    pub const BASE_EVENT_FIELDS: [&'static str; 6] =
        ["EventId", "EventType", "SourceName", "Time", "Message", "Severity"];

    /// Selects the standard fields of `BaseEventType`.
    #[must_use]
    pub fn base_event() -> Self {
        Self {
            event_type: NodeRef::base_event_type(),
            select: Self::BASE_EVENT_FIELDS
                .iter()
                .map(|name| QualifiedName::new(0, *name))
                .collect(),
        }
    }

    /// Creates a filter on `event_type` with no selected fields.
    #[must_use]
    pub fn for_type(event_type: NodeRef) -> Self {
        Self {
            event_type,
            select: Vec::new(),
        }
    }

    /// Appends a selected field.
    #[must_use]
    pub fn with_field(mut self, field: QualifiedName) -> Self {
        self.select.push(field);
        self
    }

    /// Returns the event type the fields belong to.
    #[must_use]
    pub fn event_type(&self) -> &NodeRef {
        &self.event_type
    }

    /// Returns the selected fields, in notification order.
    #[must_use]
    pub fn select_clauses(&self) -> &[QualifiedName] {
        &self.select
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::base_event()
    }
}

/// Filter attached to a monitored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemFilter {
    /// Data change filter.
    DataChange(DataChangeFilter),
    /// Event filter.
    Event(EventFilter),
}

impl ItemFilter {
    /// Returns the event filter, if this is one.
    #[must_use]
    pub fn as_event(&self) -> Option<&EventFilter> {
        match self {
            Self::Event(filter) => Some(filter),
            Self::DataChange(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_event_selects_standard_fields() {
        let filter = EventFilter::base_event();
        let names: Vec<&str> = filter.select_clauses().iter().map(QualifiedName::name).collect();
        assert_eq!(
            names,
            ["EventId", "EventType", "SourceName", "Time", "Message", "Severity"]
        );
        assert_eq!(filter.event_type(), &NodeRef::base_event_type());
    }

    #[test]
    fn custom_event_filter() {
        let filter = EventFilter::for_type(NodeRef::numeric(2, 5000))
            .with_field(QualifiedName::new(0, "Message"))
            .with_field(QualifiedName::new(2, "Pressure"));
        assert_eq!(filter.select_clauses().len(), 2);
        assert!(ItemFilter::Event(filter).as_event().is_some());
    }

    #[test]
    fn data_change_defaults() {
        let filter = DataChangeFilter::default();
        assert_eq!(filter.trigger, DataChangeTrigger::StatusValue);
        assert_eq!(filter.deadband, Deadband::None);
    }
}
