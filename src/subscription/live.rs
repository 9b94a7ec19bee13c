// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Caller-facing subscription handle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::protocol::{CreateMonitoredItem, Request, Response, Transport};
use crate::types::{NodeRef, StatusCode};

use super::{
    ClientHandle, EventFilter, Handler, ItemFilter, MonitoredItem, MonitoredItemRegistry,
    MonitoredTarget, MonitoringOptions, RevisedSettings, SequenceTracker, SubscriptionId,
    SubscriptionManager, SubscriptionSettings, SubscriptionState,
};

// =============================================================================
// Shared State
// =============================================================================

/// State shared between a [`Subscription`] handle and the routing table.
///
/// Lock order is `state` before `registry`. The delivery path only takes
/// `sequence` and `registry`, each briefly, and never while calling the
/// handler.
pub(crate) struct SubscriptionShared {
    pub(crate) id: SubscriptionId,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) state: Mutex<SubscriptionState>,
    pub(crate) registry: Mutex<MonitoredItemRegistry>,
    pub(crate) sequence: Mutex<SequenceTracker>,
    pub(crate) requested: Mutex<SubscriptionSettings>,
    pub(crate) revised: Mutex<RevisedSettings>,
}

impl SubscriptionShared {
    pub(crate) fn new(
        id: SubscriptionId,
        handler: Arc<dyn Handler>,
        requested: SubscriptionSettings,
        revised: RevisedSettings,
    ) -> Self {
        Self {
            id,
            handler,
            state: Mutex::new(SubscriptionState::Created),
            registry: Mutex::new(MonitoredItemRegistry::new()),
            sequence: Mutex::new(SequenceTracker::new()),
            requested: Mutex::new(requested),
            revised: Mutex::new(revised),
        }
    }

    /// Fails unless item and settings operations may start.
    fn ensure_operable(&self) -> Result<()> {
        self.state.lock().ensure_operable(self.id)
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// A live subscription.
///
/// Created by [`SubscriptionManager::create_subscription`]. Dropping the
/// handle does not delete the subscription on the server: notifications keep
/// flowing to its handler until [`delete`](Self::delete) or
/// [`Session::close`](crate::Session::close).
///
/// Every operation is a request/response round trip bounded by the session's
/// request timeout, or by the one set with [`with_timeout`](Self::with_timeout).
/// Clones share the same subscription.
pub struct Subscription<T: Transport> {
    shared: Arc<SubscriptionShared>,
    manager: SubscriptionManager<T>,
    timeout: Duration,
}

impl<T: Transport> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            manager: self.manager.clone(),
            timeout: self.timeout,
        }
    }
}

impl<T: Transport> Subscription<T> {
    pub(crate) fn from_parts(shared: Arc<SubscriptionShared>, manager: SubscriptionManager<T>) -> Self {
        let timeout = manager.request_timeout();
        Self {
            shared,
            manager,
            timeout,
        }
    }

    /// Returns a handle whose operations use `timeout` instead of the
    /// session's request timeout.
    ///
    /// ```ignore
    /// let handle = sub.clone().with_timeout(Duration::from_secs(2)).subscribe_data_change(&node).await?;
    /// ```
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the timeout applied to this handle's round trips.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn shared(&self) -> &Arc<SubscriptionShared> {
        &self.shared
    }

    // ========== Monitored Items ==========

    /// Monitors the `Value` attribute of `node` with the session defaults.
    ///
    /// # Errors
    ///
    /// See [`subscribe_data_change_with`](Self::subscribe_data_change_with).
    pub async fn subscribe_data_change(&self, node: &NodeRef) -> Result<ClientHandle> {
        let options = self.manager.monitoring_defaults().options();
        self.subscribe_data_change_with(node, options).await
    }

    /// Monitors one attribute of `node`.
    ///
    /// The handle is reserved before the request is sent and registered only
    /// when the server confirms; a failed or timed-out request leaves nothing
    /// behind.
    ///
    /// # Errors
    ///
    /// - `Error::Deleting` / `Error::AlreadyDeleted` if the subscription is going away
    /// - `Error::Protocol` if the server rejects the item
    /// - `Error::Timeout` if the server does not answer in time
    pub async fn subscribe_data_change_with(
        &self,
        node: &NodeRef,
        options: MonitoringOptions,
    ) -> Result<ClientHandle> {
        let target = MonitoredTarget::DataChange {
            node: node.clone(),
            attribute: options.attribute,
        };
        self.create_item(
            target,
            options.sampling_interval,
            options.queue_size,
            options.discard_oldest,
            ItemFilter::DataChange(options.filter),
        )
        .await
    }

    /// Monitors the standard events raised by the `Server` object.
    ///
    /// # Errors
    ///
    /// See [`subscribe_events_on`](Self::subscribe_events_on).
    pub async fn subscribe_events(&self) -> Result<ClientHandle> {
        self.subscribe_events_on(&NodeRef::server(), EventFilter::base_event())
            .await
    }

    /// Monitors events raised by `notifier`, selecting the fields of `filter`.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe_data_change_with`](Self::subscribe_data_change_with).
    pub async fn subscribe_events_on(
        &self,
        notifier: &NodeRef,
        filter: EventFilter,
    ) -> Result<ClientHandle> {
        let target = MonitoredTarget::Events {
            notifier: notifier.clone(),
        };
        // Queue size 0 lets the server pick its event queue size.
        self.create_item(target, Duration::ZERO, 0, true, ItemFilter::Event(filter))
            .await
    }

    /// Removes a monitored item.
    ///
    /// If the server no longer knows the item, it is removed locally and the
    /// call succeeds.
    ///
    /// # Errors
    ///
    /// - `Error::UnknownHandle` if the handle is not registered (including a
    ///   second unsubscribe of the same handle)
    /// - `Error::Deleting` / `Error::AlreadyDeleted` if the subscription is going away
    /// - `Error::Protocol` / `Error::Timeout` if the round trip fails; the item
    ///   stays registered
    pub async fn unsubscribe(&self, handle: ClientHandle) -> Result<()> {
        let id = self.shared.id;
        let server_id = {
            let state = self.shared.state.lock();
            state.ensure_operable(id)?;
            self.shared
                .registry
                .lock()
                .get(handle)
                .map(|item| item.server_id)
                .ok_or(Error::UnknownHandle {
                    subscription: id,
                    handle,
                })?
        };

        let request = Request::DeleteMonitoredItem {
            subscription_id: id,
            monitored_item_id: server_id,
        };
        match self.manager.request_within(request, self.timeout).await {
            Ok(Response::MonitoredItemDeleted) => {}
            Ok(other) => return Err(other.unexpected("MonitoredItemDeleted").into()),
            Err(Error::Protocol(e)) if e.status() == Some(StatusCode::BAD_MONITORED_ITEM_ID_INVALID) => {
                tracing::debug!(
                    subscription = %id,
                    handle = %handle,
                    "Server no longer knows the item, removing it locally"
                );
            }
            Err(e) => return Err(e),
        }

        if self.shared.registry.lock().remove(handle).is_none() {
            // A concurrent unsubscribe of the same handle won the race.
            return Err(Error::UnknownHandle {
                subscription: id,
                handle,
            });
        }
        tracing::debug!(subscription = %id, handle = %handle, "Unsubscribed monitored item");
        Ok(())
    }

    async fn create_item(
        &self,
        target: MonitoredTarget,
        sampling_interval: Duration,
        queue_size: u32,
        discard_oldest: bool,
        filter: ItemFilter,
    ) -> Result<ClientHandle> {
        let id = self.shared.id;
        let handle = {
            let state = self.shared.state.lock();
            state.ensure_operable(id)?;
            self.shared.registry.lock().allocate_handle()?
        };

        let request = Request::CreateMonitoredItem(CreateMonitoredItem {
            subscription_id: id,
            client_handle: handle,
            target: target.clone(),
            sampling_interval,
            queue_size,
            discard_oldest,
            filter: filter.clone(),
        });
        let created = match self.manager.request_within(request, self.timeout).await? {
            Response::MonitoredItemCreated(created) => created,
            other => return Err(other.unexpected("MonitoredItemCreated").into()),
        };

        let item = MonitoredItem {
            handle,
            server_id: created.monitored_item_id,
            target,
            sampling_interval: created.revised_sampling_interval,
            queue_size: created.revised_queue_size,
            filter,
        };

        let state = self.shared.state.lock();
        if state.is_terminal() {
            // The server dropped the item together with the subscription.
            return Err(Error::AlreadyDeleted(id));
        }
        self.shared.registry.lock().insert(item);
        drop(state);

        tracing::debug!(
            subscription = %id,
            handle = %handle,
            server_id = %created.monitored_item_id,
            "Created monitored item"
        );
        Ok(handle)
    }

    // ========== Subscription Settings ==========

    /// Changes the publishing interval.
    ///
    /// Returns the settings revised by the server.
    ///
    /// # Errors
    ///
    /// - `Error::Deleting` / `Error::AlreadyDeleted` if the subscription is going away
    /// - `Error::Protocol` / `Error::Timeout` if the round trip fails
    pub async fn modify(&self, publishing_interval: Duration) -> Result<RevisedSettings> {
        self.shared.ensure_operable()?;
        let settings = self
            .shared
            .requested
            .lock()
            .clone()
            .with_publishing_interval(publishing_interval);

        let request = Request::ModifySubscription {
            subscription_id: self.shared.id,
            settings: settings.clone(),
        };
        let revised = match self.manager.request_within(request, self.timeout).await? {
            Response::SubscriptionModified(revised) => revised,
            other => return Err(other.unexpected("SubscriptionModified").into()),
        };

        *self.shared.requested.lock() = settings;
        *self.shared.revised.lock() = revised;
        tracing::debug!(
            subscription = %self.shared.id,
            interval_ms = revised.publishing_interval.as_millis(),
            "Modified subscription"
        );
        Ok(revised)
    }

    /// Enables or disables publishing.
    ///
    /// While disabled the server keeps sampling but sends only keep-alives.
    ///
    /// # Errors
    ///
    /// Same as [`modify`](Self::modify).
    pub async fn set_publishing_enabled(&self, enabled: bool) -> Result<()> {
        self.shared.ensure_operable()?;
        let request = Request::SetPublishingMode {
            subscription_id: self.shared.id,
            enabled,
        };
        match self.manager.request_within(request, self.timeout).await? {
            Response::PublishingModeSet => {}
            other => return Err(other.unexpected("PublishingModeSet").into()),
        }
        self.shared.requested.lock().publishing_enabled = enabled;
        tracing::debug!(subscription = %self.shared.id, enabled, "Set publishing mode");
        Ok(())
    }

    // ========== Teardown ==========

    /// Deletes the subscription and all its monitored items.
    ///
    /// Batches still queued for this subscription are dropped by the
    /// dispatcher once the delete is confirmed.
    ///
    /// # Errors
    ///
    /// See [`SubscriptionManager::delete_subscription`].
    pub async fn delete(&self) -> Result<()> {
        self.manager.delete_subscription(self).await
    }

    // ========== Accessors ==========

    /// Returns the server-assigned id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.shared.id
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        *self.shared.state.lock()
    }

    /// Returns the settings in effect on the server.
    #[must_use]
    pub fn revised_settings(&self) -> RevisedSettings {
        *self.shared.revised.lock()
    }

    /// Returns the publishing interval in effect on the server.
    #[must_use]
    pub fn publishing_interval(&self) -> Duration {
        self.shared.revised.lock().publishing_interval
    }

    /// Returns `true` if publishing is enabled.
    #[must_use]
    pub fn is_publishing_enabled(&self) -> bool {
        self.shared.requested.lock().publishing_enabled
    }

    /// Returns the registered handles in ascending order.
    #[must_use]
    pub fn handles(&self) -> Vec<ClientHandle> {
        self.shared.registry.lock().handles()
    }

    /// Returns a copy of a registered item.
    #[must_use]
    pub fn item(&self, handle: ClientHandle) -> Option<MonitoredItem> {
        self.shared.registry.lock().get(handle).cloned()
    }

    /// Returns the number of registered items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Returns `true` if at least one event item is registered.
    #[must_use]
    pub fn event_filter_active(&self) -> bool {
        self.shared.registry.lock().has_event_items()
    }
}

impl<T: Transport> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("items", &self.item_count())
            .finish_non_exhaustive()
    }
}
