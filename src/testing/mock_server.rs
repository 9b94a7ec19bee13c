// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory [`Transport`] implementation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::browse::{BrowseEntry, BrowseFilter};
use crate::error::ProtocolError;
use crate::protocol::{
    CreateMonitoredItem, MonitoredItemCreated, NotificationBatch, Request, Response,
    SubscriptionCreated, Transport,
};
use crate::subscription::{
    MonitoredItemId, MonitoredTarget, RevisedSettings, SubscriptionId, SubscriptionSettings,
};
use crate::types::{AttributeId, DataValue, NodeClass, NodeRef, QualifiedName, StatusCode, Variant};

/// Server-side implementation of a method node.
pub type MethodCallback = Arc<dyn Fn(&[Variant]) -> Result<Vec<Variant>, StatusCode> + Send + Sync>;

/// Capacity of the notification stream.
const STREAM_CAPACITY: usize = 1024;

const STANDARD_NAMESPACE: &str = "http://opcfoundation.org/UA/";

struct MockNode {
    browse_name: QualifiedName,
    class: NodeClass,
    children: Vec<NodeRef>,
    value: Option<Variant>,
    method: Option<MethodCallback>,
}

impl MockNode {
    fn new(browse_name: QualifiedName, class: NodeClass) -> Self {
        Self {
            browse_name,
            class,
            children: Vec::new(),
            value: None,
            method: None,
        }
    }
}

struct MockSubscription {
    settings: SubscriptionSettings,
    items: BTreeMap<MonitoredItemId, CreateMonitoredItem>,
}

struct ServerState {
    nodes: HashMap<NodeRef, MockNode>,
    namespaces: Vec<String>,
    subscriptions: BTreeMap<SubscriptionId, MockSubscription>,
    next_subscription: u32,
    next_item: u32,
    reject_next: VecDeque<StatusCode>,
    stall_next: VecDeque<Duration>,
    requests: Vec<Request>,
}

struct MockInner {
    state: Mutex<ServerState>,
    stream_tx: mpsc::Sender<NotificationBatch>,
    stream_rx: Mutex<Option<mpsc::Receiver<NotificationBatch>>>,
}

/// A scripted server reachable through [`Transport`].
///
/// Starts with the standard folders (`Root`, `Objects`, `Types`, `Views`),
/// the `Server` object and its `NamespaceArray`. Subscription ids start at 1
/// and monitored item ids are unique across subscriptions.
///
/// Cloning is cheap; clones share the same server. Pass one clone to
/// [`Session::connect`](crate::Session::connect) and keep another to drive the
/// test.
#[derive(Clone)]
pub struct MockServer {
    inner: Arc<MockInner>,
}

impl MockServer {
    /// Creates a server with the standard address space.
    #[must_use]
    pub fn new() -> Self {
        let (stream_tx, stream_rx) = mpsc::channel(STREAM_CAPACITY);

        let mut nodes = HashMap::new();
        let mut insert = |parent: Option<&NodeRef>, node: NodeRef, name: &str, class| {
            nodes.insert(node.clone(), MockNode::new(QualifiedName::new(0, name), class));
            if let Some(parent) = parent.and_then(|p| nodes.get_mut(p)) {
                parent.children.push(node);
            }
        };
        insert(None, NodeRef::root(), "Root", NodeClass::Object);
        insert(Some(&NodeRef::root()), NodeRef::objects(), "Objects", NodeClass::Object);
        insert(Some(&NodeRef::root()), NodeRef::types(), "Types", NodeClass::Object);
        insert(Some(&NodeRef::root()), NodeRef::views(), "Views", NodeClass::Object);
        insert(Some(&NodeRef::objects()), NodeRef::server(), "Server", NodeClass::Object);
        insert(
            Some(&NodeRef::server()),
            NodeRef::namespace_array(),
            "NamespaceArray",
            NodeClass::Variable,
        );

        let mut state = ServerState {
            nodes,
            namespaces: vec![STANDARD_NAMESPACE.to_string()],
            subscriptions: BTreeMap::new(),
            next_subscription: 1,
            next_item: 1,
            reject_next: VecDeque::new(),
            stall_next: VecDeque::new(),
            requests: Vec::new(),
        };
        state.sync_namespace_array();

        Self {
            inner: Arc::new(MockInner {
                state: Mutex::new(state),
                stream_tx,
                stream_rx: Mutex::new(Some(stream_rx)),
            }),
        }
    }

    // ========== Address Space ==========

    /// Registers a namespace URI and returns its index.
    ///
    /// Registering the same URI twice returns the existing index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_namespace(&self, uri: &str) -> u16 {
        let mut state = self.inner.state.lock();
        let index = match state.namespaces.iter().position(|ns| ns == uri) {
            Some(index) => index,
            None => {
                state.namespaces.push(uri.to_string());
                state.sync_namespace_array();
                state.namespaces.len() - 1
            }
        };
        index as u16
    }

    /// Adds an object under `parent` and returns its reference.
    pub fn add_object(&self, parent: &NodeRef, node: NodeRef, browse_name: QualifiedName) -> NodeRef {
        self.inner
            .state
            .lock()
            .insert_node(parent, node, MockNode::new(browse_name, NodeClass::Object))
    }

    /// Adds a writable variable under `parent` and returns its reference.
    pub fn add_variable(
        &self,
        parent: &NodeRef,
        node: NodeRef,
        browse_name: QualifiedName,
        value: impl Into<Variant>,
    ) -> NodeRef {
        let mut entry = MockNode::new(browse_name, NodeClass::Variable);
        entry.value = Some(value.into());
        self.inner.state.lock().insert_node(parent, node, entry)
    }

    /// Adds a method under `parent` and returns its reference.
    ///
    /// `callback` runs while the server state is locked and must not call
    /// back into the server.
    pub fn add_method<F>(
        &self,
        parent: &NodeRef,
        node: NodeRef,
        browse_name: QualifiedName,
        callback: F,
    ) -> NodeRef
    where
        F: Fn(&[Variant]) -> Result<Vec<Variant>, StatusCode> + Send + Sync + 'static,
    {
        let mut entry = MockNode::new(browse_name, NodeClass::Method);
        entry.method = Some(Arc::new(callback));
        self.inner.state.lock().insert_node(parent, node, entry)
    }

    /// Replaces the value of a variable. Returns `false` if there is no such variable.
    pub fn set_value(&self, node: &NodeRef, value: impl Into<Variant>) -> bool {
        match self.inner.state.lock().nodes.get_mut(node) {
            Some(entry) if entry.class == NodeClass::Variable => {
                entry.value = Some(value.into());
                true
            }
            _ => false,
        }
    }

    /// Returns the current value of a variable.
    #[must_use]
    pub fn value(&self, node: &NodeRef) -> Option<Variant> {
        self.inner.state.lock().nodes.get(node).and_then(|entry| entry.value.clone())
    }

    /// Removes a node and unlinks it from its parents.
    ///
    /// Children of the node stay in place but are no longer reachable by
    /// browsing. Returns `false` if the node did not exist.
    pub fn remove_node(&self, node: &NodeRef) -> bool {
        let mut state = self.inner.state.lock();
        if state.nodes.remove(node).is_none() {
            return false;
        }
        for entry in state.nodes.values_mut() {
            entry.children.retain(|child| child != node);
        }
        true
    }

    // ========== Failure Injection ==========

    /// Rejects the next request with `status`.
    ///
    /// Queued rejections apply to consecutive requests in order.
    pub fn reject_next(&self, status: StatusCode) {
        self.inner.state.lock().reject_next.push_back(status);
    }

    /// Delays the response to the next request by `delay`.
    ///
    /// The request still takes effect on the server immediately, as it would
    /// when a real response is lost or late.
    pub fn stall_next(&self, delay: Duration) {
        self.inner.state.lock().stall_next.push_back(delay);
    }

    /// Makes the next created subscription use `id`.
    pub fn set_next_subscription_id(&self, id: u32) {
        self.inner.state.lock().next_subscription = id;
    }

    /// Drops a subscription on the server side only.
    ///
    /// Returns `false` if the server did not know it.
    pub fn expire_subscription(&self, id: SubscriptionId) -> bool {
        self.inner.state.lock().subscriptions.remove(&id).is_some()
    }

    // ========== Notifications ==========

    /// Pushes a batch onto the notification stream.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::ChannelClosed` once the stream's receiver is gone.
    pub async fn push(&self, batch: NotificationBatch) -> Result<(), ProtocolError> {
        self.inner
            .stream_tx
            .send(batch)
            .await
            .map_err(|_| ProtocolError::ChannelClosed("notification stream".to_string()))
    }

    // ========== Inspection ==========

    /// Returns every request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        self.inner.state.lock().requests.clone()
    }

    /// Returns the number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.inner.state.lock().requests.len()
    }

    /// Returns the ids of the subscriptions the server holds.
    #[must_use]
    pub fn live_subscriptions(&self) -> Vec<SubscriptionId> {
        self.inner.state.lock().subscriptions.keys().copied().collect()
    }

    /// Returns the item requests the server holds for a subscription.
    #[must_use]
    pub fn monitored_items(&self, subscription: SubscriptionId) -> Vec<CreateMonitoredItem> {
        self.inner
            .state
            .lock()
            .subscriptions
            .get(&subscription)
            .map(|sub| sub.items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the settings the server holds for a subscription.
    #[must_use]
    pub fn subscription_settings(&self, subscription: SubscriptionId) -> Option<SubscriptionSettings> {
        self.inner
            .state
            .lock()
            .subscriptions
            .get(&subscription)
            .map(|sub| sub.settings.clone())
    }
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MockServer")
            .field("nodes", &state.nodes.len())
            .field("subscriptions", &state.subscriptions.len())
            .field("requests", &state.requests.len())
            .finish_non_exhaustive()
    }
}

impl Transport for MockServer {
    async fn send_request(&self, request: Request) -> Result<Response, ProtocolError> {
        let (outcome, stall) = {
            let mut state = self.inner.state.lock();
            state.requests.push(request.clone());
            let stall = state.stall_next.pop_front();
            let outcome = match state.reject_next.pop_front() {
                Some(status) => Err(ProtocolError::rejected(status, request.kind())),
                None => state.handle(request),
            };
            (outcome, stall)
        };

        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    fn notifications(&self) -> Option<mpsc::Receiver<NotificationBatch>> {
        self.inner.stream_rx.lock().take()
    }
}

// =============================================================================
// Request Handling
// =============================================================================

impl ServerState {
    fn insert_node(&mut self, parent: &NodeRef, node: NodeRef, entry: MockNode) -> NodeRef {
        self.nodes.insert(node.clone(), entry);
        if let Some(parent) = self.nodes.get_mut(parent) {
            if !parent.children.contains(&node) {
                parent.children.push(node.clone());
            }
        }
        node
    }

    fn sync_namespace_array(&mut self) {
        let array = Variant::from(self.namespaces.clone());
        if let Some(entry) = self.nodes.get_mut(&NodeRef::namespace_array()) {
            entry.value = Some(array);
        }
    }

    fn handle(&mut self, request: Request) -> Result<Response, ProtocolError> {
        let kind = request.kind();
        let reject = |status| ProtocolError::rejected(status, kind);

        match request {
            Request::CreateSubscription(settings) => {
                let id = SubscriptionId::new(self.next_subscription);
                self.next_subscription = self.next_subscription.wrapping_add(1).max(1);
                let revised = RevisedSettings::from_requested(&settings);
                self.subscriptions.insert(
                    id,
                    MockSubscription {
                        settings,
                        items: BTreeMap::new(),
                    },
                );
                Ok(Response::SubscriptionCreated(SubscriptionCreated {
                    subscription_id: id,
                    revised,
                }))
            }
            Request::ModifySubscription {
                subscription_id,
                settings,
            } => {
                let sub = self
                    .subscriptions
                    .get_mut(&subscription_id)
                    .ok_or_else(|| reject(StatusCode::BAD_SUBSCRIPTION_ID_INVALID))?;
                let revised = RevisedSettings::from_requested(&settings);
                sub.settings = settings;
                Ok(Response::SubscriptionModified(revised))
            }
            Request::SetPublishingMode {
                subscription_id,
                enabled,
            } => {
                let sub = self
                    .subscriptions
                    .get_mut(&subscription_id)
                    .ok_or_else(|| reject(StatusCode::BAD_SUBSCRIPTION_ID_INVALID))?;
                sub.settings.publishing_enabled = enabled;
                Ok(Response::PublishingModeSet)
            }
            Request::DeleteSubscription { subscription_id } => {
                self.subscriptions
                    .remove(&subscription_id)
                    .ok_or_else(|| reject(StatusCode::BAD_SUBSCRIPTION_ID_INVALID))?;
                Ok(Response::SubscriptionDeleted)
            }
            Request::CreateMonitoredItem(create) => {
                if !self.subscriptions.contains_key(&create.subscription_id) {
                    return Err(reject(StatusCode::BAD_SUBSCRIPTION_ID_INVALID));
                }
                let node = self
                    .nodes
                    .get(create.target.node())
                    .ok_or_else(|| reject(StatusCode::BAD_NODE_ID_UNKNOWN))?;
                if let MonitoredTarget::DataChange { attribute, .. } = &create.target {
                    if *attribute == AttributeId::Value && node.value.is_none() {
                        return Err(reject(StatusCode::BAD_ATTRIBUTE_ID_INVALID));
                    }
                }

                let id = MonitoredItemId::new(self.next_item);
                self.next_item += 1;
                let created = MonitoredItemCreated {
                    monitored_item_id: id,
                    revised_sampling_interval: create.sampling_interval,
                    revised_queue_size: create.queue_size.max(1),
                };
                if let Some(sub) = self.subscriptions.get_mut(&create.subscription_id) {
                    sub.items.insert(id, create);
                }
                Ok(Response::MonitoredItemCreated(created))
            }
            Request::DeleteMonitoredItem {
                subscription_id,
                monitored_item_id,
            } => {
                let sub = self
                    .subscriptions
                    .get_mut(&subscription_id)
                    .ok_or_else(|| reject(StatusCode::BAD_SUBSCRIPTION_ID_INVALID))?;
                sub.items
                    .remove(&monitored_item_id)
                    .ok_or_else(|| reject(StatusCode::BAD_MONITORED_ITEM_ID_INVALID))?;
                Ok(Response::MonitoredItemDeleted)
            }
            Request::Read { node, attribute } => {
                let entry = self
                    .nodes
                    .get(&node)
                    .ok_or_else(|| reject(StatusCode::BAD_NODE_ID_UNKNOWN))?;
                let value = match attribute {
                    AttributeId::Value => entry
                        .value
                        .clone()
                        .ok_or_else(|| reject(StatusCode::BAD_ATTRIBUTE_ID_INVALID))?,
                    AttributeId::BrowseName => Variant::from(entry.browse_name.to_string()),
                    AttributeId::DisplayName => Variant::from(entry.browse_name.name()),
                    AttributeId::NodeId => Variant::from(node.clone()),
                    _ => return Err(reject(StatusCode::BAD_ATTRIBUTE_ID_INVALID)),
                };
                Ok(Response::Value(
                    DataValue::new(value).with_server_timestamp(Utc::now()),
                ))
            }
            Request::Write {
                node,
                attribute,
                value,
            } => {
                let entry = self
                    .nodes
                    .get_mut(&node)
                    .ok_or_else(|| reject(StatusCode::BAD_NODE_ID_UNKNOWN))?;
                if attribute != AttributeId::Value || entry.value.is_none() {
                    return Err(reject(StatusCode::BAD_NOT_WRITABLE));
                }
                entry.value = Some(value);
                Ok(Response::Written)
            }
            Request::Browse { node, filter } => {
                let entry = self
                    .nodes
                    .get(&node)
                    .ok_or_else(|| reject(StatusCode::BAD_NODE_ID_UNKNOWN))?;
                Ok(Response::Browsed(self.browse(entry, &filter)))
            }
            Request::Call {
                object,
                method,
                arguments,
            } => {
                let parent = self
                    .nodes
                    .get(&object)
                    .ok_or_else(|| reject(StatusCode::BAD_NODE_ID_UNKNOWN))?;
                let callback = parent
                    .children
                    .contains(&method)
                    .then(|| self.nodes.get(&method))
                    .flatten()
                    .and_then(|entry| entry.method.clone())
                    .ok_or_else(|| reject(StatusCode::BAD_METHOD_INVALID))?;
                let outputs = callback(&arguments).map_err(reject)?;
                Ok(Response::Called(outputs))
            }
        }
    }

    fn browse(&self, parent: &MockNode, filter: &BrowseFilter) -> Vec<BrowseEntry> {
        parent
            .children
            .iter()
            .filter_map(|child| {
                let entry = self.nodes.get(child)?;
                Some(BrowseEntry::new(
                    entry.browse_name.clone(),
                    child.clone(),
                    entry.class,
                ))
            })
            .filter(|entry| filter.matches(entry))
            .collect()
    }
}
