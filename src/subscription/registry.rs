// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-subscription mapping from client handle to monitored item.

use std::collections::BTreeMap;

use crate::error::ValueError;

use super::{ClientHandle, MonitoredItem};

/// Monitored items of one subscription, keyed by client handle.
///
/// Handles come from a monotonic counter that starts at 1 and never goes
/// back, so a handle is never handed out twice for the same subscription even
/// after its item is removed.
///
/// The registry itself is not synchronized; the owning subscription keeps it
/// behind a lock.
#[derive(Debug)]
pub struct MonitoredItemRegistry {
    next_handle: u32,
    items: BTreeMap<ClientHandle, MonitoredItem>,
}

impl MonitoredItemRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            items: BTreeMap::new(),
        }
    }

    /// Reserves the next client handle.
    ///
    /// The handle is consumed even if the item is never inserted.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::HandlesExhausted` once `u32::MAX` handles have been
    /// handed out.
    pub fn allocate_handle(&mut self) -> Result<ClientHandle, ValueError> {
        let handle = self.next_handle;
        self.next_handle = handle.checked_add(1).ok_or(ValueError::HandlesExhausted)?;
        Ok(ClientHandle::new(handle))
    }

    /// Registers an item under its handle.
    ///
    /// Returns the previous item if the handle was already registered.
    pub fn insert(&mut self, item: MonitoredItem) -> Option<MonitoredItem> {
        self.items.insert(item.handle, item)
    }

    /// Removes an item.
    pub fn remove(&mut self, handle: ClientHandle) -> Option<MonitoredItem> {
        self.items.remove(&handle)
    }

    /// Looks up an item.
    #[must_use]
    pub fn get(&self, handle: ClientHandle) -> Option<&MonitoredItem> {
        self.items.get(&handle)
    }

    /// Returns `true` if the handle is registered.
    #[must_use]
    pub fn contains(&self, handle: ClientHandle) -> bool {
        self.items.contains_key(&handle)
    }

    /// Returns the registered handles in ascending order.
    #[must_use]
    pub fn handles(&self) -> Vec<ClientHandle> {
        self.items.keys().copied().collect()
    }

    /// Returns the number of registered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no item is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if at least one event item is registered.
    #[must_use]
    pub fn has_event_items(&self) -> bool {
        self.items.values().any(MonitoredItem::is_event_item)
    }

    /// Drops every item. The handle counter keeps its position.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl Default for MonitoredItemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::subscription::{
        DataChangeFilter, EventFilter, ItemFilter, MonitoredItemId, MonitoredTarget,
    };
    use crate::types::{AttributeId, NodeRef};

    fn data_item(handle: ClientHandle) -> MonitoredItem {
        MonitoredItem {
            handle,
            server_id: MonitoredItemId::new(handle.value() + 100),
            target: MonitoredTarget::DataChange {
                node: NodeRef::numeric(2, 1002),
                attribute: AttributeId::Value,
            },
            sampling_interval: Duration::from_millis(100),
            queue_size: 1,
            filter: ItemFilter::DataChange(DataChangeFilter::default()),
        }
    }

    #[test]
    fn handles_start_at_one_and_increase() {
        let mut registry = MonitoredItemRegistry::new();
        assert_eq!(registry.allocate_handle().unwrap(), ClientHandle::new(1));
        assert_eq!(registry.allocate_handle().unwrap(), ClientHandle::new(2));
    }

    #[test]
    fn handles_are_not_reused_after_remove() {
        let mut registry = MonitoredItemRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let handle = registry.allocate_handle().unwrap();
            registry.insert(data_item(handle));
            handles.push(handle);
        }
        assert!(registry.remove(handles[1]).is_some());

        let fourth = registry.allocate_handle().unwrap();
        assert!(handles.iter().all(|h| fourth > *h));
        assert_eq!(registry.handles(), vec![handles[0], handles[2]]);
    }

    #[test]
    fn allocation_fails_when_exhausted() {
        let mut registry = MonitoredItemRegistry {
            next_handle: u32::MAX,
            items: BTreeMap::new(),
        };
        assert_eq!(registry.allocate_handle(), Err(ValueError::HandlesExhausted));
    }

    #[test]
    fn clear_keeps_counter() {
        let mut registry = MonitoredItemRegistry::new();
        let handle = registry.allocate_handle().unwrap();
        registry.insert(data_item(handle));
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.allocate_handle().unwrap(), ClientHandle::new(2));
    }

    #[test]
    fn event_item_detection() {
        let mut registry = MonitoredItemRegistry::new();
        let handle = registry.allocate_handle().unwrap();
        registry.insert(data_item(handle));
        assert!(!registry.has_event_items());

        let handle = registry.allocate_handle().unwrap();
        registry.insert(MonitoredItem {
            target: MonitoredTarget::Events {
                notifier: NodeRef::server(),
            },
            filter: ItemFilter::Event(EventFilter::base_event()),
            ..data_item(handle)
        });
        assert!(registry.has_event_items());
        assert!(registry.contains(handle));
    }
}
