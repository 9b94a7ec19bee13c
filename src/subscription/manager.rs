// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscription table, lifecycle operations and notification routing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::{MonitoringDefaults, SessionConfig};
use crate::dispatch::{
    Callback, DeliveryContext, DropReason, HandlerFault, NotificationRouter, invoke_guarded,
};
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{NotificationBatch, Request, Response, Transport, round_trip};
use crate::types::StatusCode;

use super::live::SubscriptionShared;
use super::{
    DataChangeMeta, EventNotification, Handler, MonitoredTarget, SequenceCheck, Subscription,
    SubscriptionId, SubscriptionSettings, SubscriptionState,
};

// =============================================================================
// Subscription Table
// =============================================================================

/// Live subscriptions of a session, keyed by server id.
///
/// Shared by the request path (insert on create, remove on confirmed delete)
/// and the dispatcher thread (lookup per batch).
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    entries: RwLock<HashMap<SubscriptionId, Arc<SubscriptionShared>>>,
}

impl SubscriptionTable {
    fn insert(&self, shared: Arc<SubscriptionShared>) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&shared.id) {
            return Err(ProtocolError::DuplicateSubscriptionId(shared.id.value()).into());
        }
        entries.insert(shared.id, shared);
        Ok(())
    }

    fn remove(&self, id: SubscriptionId) -> Option<Arc<SubscriptionShared>> {
        self.entries.write().remove(&id)
    }

    fn get(&self, id: SubscriptionId) -> Option<Arc<SubscriptionShared>> {
        self.entries.read().get(&id).cloned()
    }

    fn snapshot(&self) -> Vec<Arc<SubscriptionShared>> {
        let mut all: Vec<_> = self.entries.read().values().cloned().collect();
        all.sort_by_key(|shared| shared.id);
        all
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl NotificationRouter for SubscriptionTable {
    fn route_notification(&self, batch: &NotificationBatch, ctx: &DeliveryContext) {
        let id = batch.subscription_id;
        let sequence = batch.sequence_number;

        let Some(shared) = self.get(id) else {
            ctx.dropped(id, sequence, DropReason::UnknownSubscription);
            return;
        };

        if batch.is_keep_alive() {
            ctx.keep_alive(id, sequence);
            return;
        }

        let (last, check) = {
            let mut tracker = shared.sequence.lock();
            let last = tracker.last();
            (last, tracker.admit(sequence))
        };
        match check {
            SequenceCheck::Stale => {
                ctx.dropped(id, sequence, DropReason::Stale);
                return;
            }
            SequenceCheck::Gap { missing } => {
                ctx.gap(id, last.unwrap_or_default(), sequence, missing);
            }
            SequenceCheck::First | SequenceCheck::InOrder => {}
        }

        deliver_data_changes(&shared, batch, ctx);
        deliver_events(&shared, batch, ctx);
        ctx.delivered(id, sequence, batch.len());
    }
}

fn deliver_data_changes(shared: &SubscriptionShared, batch: &NotificationBatch, ctx: &DeliveryContext) {
    for entry in &batch.data_changes {
        let target = shared.registry.lock().get(entry.handle).map(|item| item.target.clone());
        let Some(MonitoredTarget::DataChange { node, attribute }) = target else {
            ctx.skipped(shared.id, entry.handle);
            continue;
        };

        let meta = DataChangeMeta {
            subscription_id: shared.id,
            handle: entry.handle,
            attribute,
            status: entry.value.status,
            source_timestamp: entry.value.source_timestamp,
            server_timestamp: entry.value.server_timestamp,
            sequence_number: batch.sequence_number,
        };
        match invoke_guarded(|| shared.handler.on_data_change(&node, &entry.value.value, &meta)) {
            Ok(()) => ctx.data_change_delivered(),
            Err(kind) => ctx.fault(&HandlerFault {
                subscription_id: shared.id,
                handle: entry.handle,
                sequence_number: batch.sequence_number,
                callback: Callback::DataChange,
                kind,
            }),
        }
    }
}

fn deliver_events(shared: &SubscriptionShared, batch: &NotificationBatch, ctx: &DeliveryContext) {
    for entry in &batch.events {
        let resolved = shared.registry.lock().get(entry.handle).and_then(|item| {
            let filter = item.filter.as_event()?;
            Some((item.node().clone(), filter.select_clauses().to_vec()))
        });
        let Some((notifier, names)) = resolved else {
            ctx.skipped(shared.id, entry.handle);
            continue;
        };

        let event = EventNotification::new(
            shared.id,
            entry.handle,
            notifier,
            batch.sequence_number,
            names,
            entry.fields.clone(),
        );
        match invoke_guarded(|| shared.handler.on_event(&event)) {
            Ok(()) => ctx.event_delivered(),
            Err(kind) => ctx.fault(&HandlerFault {
                subscription_id: shared.id,
                handle: entry.handle,
                sequence_number: batch.sequence_number,
                callback: Callback::Event,
                kind,
            }),
        }
    }
}

// =============================================================================
// Subscription Manager
// =============================================================================

struct ManagerInner<T> {
    transport: Arc<T>,
    table: Arc<SubscriptionTable>,
    request_timeout: Duration,
    subscription_defaults: SubscriptionSettings,
    monitoring_defaults: MonitoringDefaults,
}

/// Owns the live subscriptions of a session.
///
/// Cloning is cheap; clones share the same table and transport.
pub struct SubscriptionManager<T: Transport> {
    inner: Arc<ManagerInner<T>>,
}

impl<T: Transport> Clone for SubscriptionManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> SubscriptionManager<T> {
    /// Creates a manager with an empty table.
    #[must_use]
    pub fn new(transport: Arc<T>, config: &SessionConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                table: Arc::new(SubscriptionTable::default()),
                request_timeout: config.request_timeout,
                subscription_defaults: config.subscription.clone(),
                monitoring_defaults: config.monitoring,
            }),
        }
    }

    /// Creates a subscription with the default settings and the given interval.
    ///
    /// # Errors
    ///
    /// See [`create_subscription_with`](Self::create_subscription_with).
    pub async fn create_subscription(
        &self,
        publishing_interval: Duration,
        handler: Arc<dyn Handler>,
    ) -> Result<Subscription<T>> {
        let settings = self
            .inner
            .subscription_defaults
            .clone()
            .with_publishing_interval(publishing_interval);
        self.create_subscription_with(settings, handler).await
    }

    /// Creates a subscription.
    ///
    /// The local entry is keyed by the id the server returns and becomes
    /// routable as soon as this returns.
    ///
    /// # Errors
    ///
    /// - `Error::Protocol` if the server rejects the request (never retried)
    ///   or returns an id that is already live
    /// - `Error::Timeout` if the server does not answer in time
    pub async fn create_subscription_with(
        &self,
        settings: SubscriptionSettings,
        handler: Arc<dyn Handler>,
    ) -> Result<Subscription<T>> {
        let created = match self.request(Request::CreateSubscription(settings.clone())).await? {
            Response::SubscriptionCreated(created) => created,
            other => return Err(other.unexpected("SubscriptionCreated").into()),
        };

        let shared = Arc::new(SubscriptionShared::new(
            created.subscription_id,
            handler,
            settings,
            created.revised,
        ));
        self.inner.table.insert(Arc::clone(&shared))?;
        *shared.state.lock() = SubscriptionState::Active;

        tracing::info!(
            subscription = %created.subscription_id,
            interval_ms = created.revised.publishing_interval.as_millis(),
            "Created subscription"
        );
        Ok(Subscription::from_parts(shared, self.clone()))
    }

    /// Deletes a subscription.
    ///
    /// The local entry is removed only after the server confirms, so batches
    /// in flight keep resolving until then and take the unknown-subscription
    /// path afterwards. If the server reports the subscription as already
    /// gone, it is removed locally and the call succeeds.
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyDeleted` if it was deleted before
    /// - `Error::Deleting` if another delete is in flight
    /// - `Error::Protocol` / `Error::Timeout` if the round trip fails; the
    ///   subscription goes back to `Active`
    pub async fn delete_subscription(&self, subscription: &Subscription<T>) -> Result<()> {
        let shared = subscription.shared();
        let id = shared.id;
        {
            let mut state = shared.state.lock();
            state.ensure_operable(id)?;
            *state = SubscriptionState::Deleting;
        }

        let request = Request::DeleteSubscription { subscription_id: id };
        let outcome = match self.request_within(request, subscription.timeout()).await {
            Ok(Response::SubscriptionDeleted) => Ok(()),
            Ok(other) => Err(other.unexpected("SubscriptionDeleted").into()),
            Err(Error::Protocol(e)) if e.status() == Some(StatusCode::BAD_SUBSCRIPTION_ID_INVALID) => {
                tracing::warn!(subscription = %id, "Server no longer knows the subscription");
                Ok(())
            }
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            *shared.state.lock() = SubscriptionState::Active;
            tracing::warn!(subscription = %id, error = %e, "Failed to delete subscription");
            return Err(e);
        }

        self.inner.table.remove(id);
        {
            let mut state = shared.state.lock();
            *state = SubscriptionState::Deleted;
            shared.registry.lock().clear();
        }
        tracing::info!(subscription = %id, "Deleted subscription");
        Ok(())
    }

    /// Deletes every live subscription.
    ///
    /// All subscriptions are attempted even if some fail.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    pub async fn delete_all(&self) -> Result<()> {
        let mut first_error = None;
        for shared in self.inner.table.snapshot() {
            let subscription = Subscription::from_parts(shared, self.clone());
            match self.delete_subscription(&subscription).await {
                Ok(()) | Err(Error::AlreadyDeleted(_) | Error::Deleting(_)) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Returns the router the dispatcher delivers through.
    #[must_use]
    pub fn router(&self) -> Arc<dyn NotificationRouter> {
        Arc::clone(&self.inner.table) as Arc<dyn NotificationRouter>
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.table.len()
    }

    /// Returns the ids of the live subscriptions in ascending order.
    #[must_use]
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.inner.table.snapshot().iter().map(|shared| shared.id).collect()
    }

    /// Returns `true` if a subscription with this id is live.
    #[must_use]
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.inner.table.get(id).is_some()
    }

    /// Returns the transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.inner.transport
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    pub(crate) fn monitoring_defaults(&self) -> &MonitoringDefaults {
        &self.inner.monitoring_defaults
    }

    pub(crate) async fn request(&self, request: Request) -> Result<Response> {
        self.request_within(request, self.inner.request_timeout).await
    }

    pub(crate) async fn request_within(&self, request: Request, timeout: Duration) -> Result<Response> {
        round_trip(self.inner.transport.as_ref(), request, timeout).await
    }
}

impl<T: Transport> fmt::Debug for SubscriptionManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("subscriptions", &self.subscription_ids())
            .field("request_timeout", &self.inner.request_timeout)
            .finish_non_exhaustive()
    }
}
