// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client session façade.
//!
//! A [`Session`] ties one [`Transport`] to a [`SubscriptionManager`], a
//! [`NotificationDispatcher`] and a [`PathResolver`]. It owns the pump task
//! that moves batches from the transport's notification stream into the
//! dispatcher queue.

mod node;

pub use node::{Node, Nodes};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::browse::{BrowseEntry, BrowseFilter, PathResolver};
use crate::config::SessionConfig;
use crate::dispatch::{
    DispatchObserver, DispatchStatsSnapshot, NotificationDispatcher, TracingObserver,
};
use crate::error::{Error, ProtocolError, Result, ValueError};
use crate::protocol::{
    MethodCaller, NotificationBatch, Request, Response, Transport, round_trip, with_timeout,
};
use crate::subscription::{Handler, Subscription, SubscriptionManager, SubscriptionSettings};
use crate::types::{AttributeId, BrowsePath, DataValue, NodeRef, SessionId, Variant};

/// A client session over a transport.
///
/// # Examples
///
/// ```ignore
/// let session = Session::connect(transport, SessionConfig::default())?;
///
/// let var = session
///     .nodes()
///     .root()
///     .child(["0:Objects", "2:MyObject", "2:MyVariable"])
///     .await?;
///
/// let sub = session.create_subscription(Duration::from_millis(500), handler).await?;
/// let handle = sub.subscribe_data_change(var.node_ref()).await?;
///
/// sub.unsubscribe(handle).await?;
/// sub.delete().await?;
/// session.close().await?;
/// ```
pub struct Session<T: Transport> {
    id: SessionId,
    config: SessionConfig,
    manager: SubscriptionManager<T>,
    dispatcher: Arc<NotificationDispatcher>,
    resolver: PathResolver,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> Session<T> {
    /// Starts a session with the default [`TracingObserver`].
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// See [`connect_with_observer`](Self::connect_with_observer).
    pub fn connect(transport: T, config: SessionConfig) -> Result<Self> {
        let id = SessionId::new();
        Self::start(id, Arc::new(transport), config, Arc::new(TracingObserver::for_session(id)))
    }

    /// Starts a session that reports delivery events to `observer`.
    ///
    /// Takes the transport's notification stream, starts the dispatcher
    /// thread and spawns the pump task.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the configuration is invalid
    /// - `Error::Protocol` if the notification stream was already taken
    /// - `Error::Runtime` outside a tokio runtime
    /// - `Error::DispatcherSpawn` if the delivery thread cannot start
    pub fn connect_with_observer(
        transport: Arc<T>,
        config: SessionConfig,
        observer: Arc<dyn DispatchObserver>,
    ) -> Result<Self> {
        Self::start(SessionId::new(), transport, config, observer)
    }

    fn start(
        id: SessionId,
        transport: Arc<T>,
        config: SessionConfig,
        observer: Arc<dyn DispatchObserver>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
        let stream = transport.notifications().ok_or_else(|| {
            ProtocolError::ChannelClosed("notification stream already taken".to_string())
        })?;

        let manager = SubscriptionManager::new(transport, &config);
        let dispatcher = Arc::new(NotificationDispatcher::spawn(
            manager.router(),
            &config.dispatch,
            observer,
        )?);
        let pump = runtime.spawn(pump(stream, Arc::clone(&dispatcher), id));

        let resolver = if config.path_cache {
            PathResolver::with_cache()
        } else {
            PathResolver::new()
        };

        tracing::info!(session = %id, "Session started");
        Ok(Self {
            id,
            config,
            manager,
            dispatcher,
            resolver,
            pump: Mutex::new(Some(pump)),
        })
    }

    // ========== Accessors ==========

    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the subscription manager.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionManager<T> {
        &self.manager
    }

    /// Returns the transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        self.manager.transport()
    }

    /// Returns the standard nodes of the address space.
    #[must_use]
    pub fn nodes(&self) -> Nodes<'_, T> {
        Nodes::new(self)
    }

    /// Returns a helper bound to `node`.
    #[must_use]
    pub fn node(&self, node: NodeRef) -> Node<'_, T> {
        Node::new(self, node)
    }

    // ========== Subscriptions ==========

    /// Creates a subscription with the configured defaults.
    ///
    /// # Errors
    ///
    /// See [`SubscriptionManager::create_subscription_with`].
    pub async fn create_subscription(
        &self,
        publishing_interval: Duration,
        handler: impl Handler + 'static,
    ) -> Result<Subscription<T>> {
        self.manager
            .create_subscription(publishing_interval, Arc::new(handler))
            .await
    }

    /// Creates a subscription with explicit settings.
    ///
    /// # Errors
    ///
    /// See [`SubscriptionManager::create_subscription_with`].
    pub async fn create_subscription_with(
        &self,
        settings: SubscriptionSettings,
        handler: Arc<dyn Handler>,
    ) -> Result<Subscription<T>> {
        self.manager.create_subscription_with(settings, handler).await
    }

    // ========== Address Space ==========

    /// Resolves `path` starting at `root`.
    ///
    /// # Errors
    ///
    /// See [`PathResolver::resolve`].
    pub async fn resolve(&self, root: &NodeRef, path: &BrowsePath) -> Result<NodeRef> {
        self.resolver
            .resolve(self.transport().as_ref(), root, path, self.config.request_timeout)
            .await
    }

    /// Returns the path resolver.
    #[must_use]
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Lists the children of `node` that pass `filter`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` or `Error::Timeout` if the browse fails.
    pub async fn browse(&self, node: &NodeRef, filter: BrowseFilter) -> Result<Vec<BrowseEntry>> {
        let request = Request::Browse {
            node: node.clone(),
            filter,
        };
        match self.request(request).await? {
            Response::Browsed(entries) => Ok(entries),
            other => Err(other.unexpected("Browsed").into()),
        }
    }

    /// Reads one attribute.
    ///
    /// A bad status on the value itself is returned inside the [`DataValue`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` or `Error::Timeout` if the read fails.
    pub async fn read(&self, node: &NodeRef, attribute: AttributeId) -> Result<DataValue> {
        let request = Request::Read {
            node: node.clone(),
            attribute,
        };
        match self.request(request).await? {
            Response::Value(value) => Ok(value),
            other => Err(other.unexpected("Value").into()),
        }
    }

    /// Writes one attribute.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` or `Error::Timeout` if the write fails.
    pub async fn write(&self, node: &NodeRef, attribute: AttributeId, value: Variant) -> Result<()> {
        let request = Request::Write {
            node: node.clone(),
            attribute,
            value,
        };
        match self.request(request).await? {
            Response::Written => Ok(()),
            other => Err(other.unexpected("Written").into()),
        }
    }

    /// Calls `method` on `object`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Method` if the call fails and `Error::Timeout` if it
    /// does not complete in time.
    pub async fn call_method(
        &self,
        object: &NodeRef,
        method: &NodeRef,
        arguments: Vec<Variant>,
    ) -> Result<Vec<Variant>> {
        let call = self.transport().call_method(object, method, arguments);
        let outputs = with_timeout(self.config.request_timeout, call).await?;
        tracing::debug!(session = %self.id, object = %object, method = %method, "Called method");
        Ok(outputs)
    }

    /// Reads the server's namespace array.
    ///
    /// # Errors
    ///
    /// Returns `Error::Value` if the value is not a string array.
    pub async fn namespace_array(&self) -> Result<Vec<String>> {
        let value = self.read(&NodeRef::namespace_array(), AttributeId::Value).await?;
        if value.status.is_bad() {
            return Err(ProtocolError::rejected(value.status, "read NamespaceArray").into());
        }
        Ok(value.value.to_string_array()?)
    }

    /// Returns the index of a namespace URI.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::UnknownNamespace` if the server does not list `uri`.
    pub async fn namespace_index(&self, uri: &str) -> Result<u16> {
        let namespaces = self.namespace_array().await?;
        namespaces
            .iter()
            .position(|ns| ns == uri)
            .and_then(|idx| u16::try_from(idx).ok())
            .ok_or_else(|| ValueError::UnknownNamespace(uri.to_string()).into())
    }

    // ========== Delivery ==========

    /// Returns the delivery counters.
    #[must_use]
    pub fn dispatch_stats(&self) -> DispatchStatsSnapshot {
        self.dispatcher.stats()
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// Waits until every batch queued so far has been delivered.
    ///
    /// Batches still in the transport's stream are not covered.
    ///
    /// # Errors
    ///
    /// Returns `Error::DispatcherStopped` after [`close`](Self::close).
    pub async fn flush_notifications(&self) -> Result<()> {
        self.dispatcher.flush().await
    }

    /// Deletes every subscription and stops delivery.
    ///
    /// Delivery is stopped even if some deletes fail; batches already queued
    /// are delivered or dropped before this returns.
    ///
    /// # Errors
    ///
    /// Returns the first delete failure.
    pub async fn close(&self) -> Result<()> {
        let deleted = self.manager.delete_all().await;

        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.dispatcher.shutdown().await?;

        tracing::info!(session = %self.id, "Session closed");
        deleted
    }

    async fn request(&self, request: Request) -> Result<Response> {
        round_trip(self.transport().as_ref(), request, self.config.request_timeout).await
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("subscriptions", &self.manager.subscription_count())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Moves batches from the transport stream into the dispatcher queue.
async fn pump(
    mut stream: mpsc::Receiver<NotificationBatch>,
    dispatcher: Arc<NotificationDispatcher>,
    session: SessionId,
) {
    while let Some(batch) = stream.recv().await {
        match dispatcher.submit(batch).await {
            // Under `Reject` the batch is dropped, already counted and reported.
            Ok(()) | Err(Error::QueueFull) => {}
            Err(e) => {
                tracing::debug!(session = %session, error = %e, "Notification pump stopping");
                return;
            }
        }
    }
    tracing::debug!(session = %session, "Notification stream ended");
}
