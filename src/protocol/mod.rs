// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces to the external protocol stack.
//!
//! The wire codec, the secure channel and the server live outside this crate.
//! They are reached through three narrow traits:
//!
//! - [`Transport`]: typed request/response round trips plus the out-of-band
//!   notification stream
//! - [`Browser`]: children of a node, used by path resolution
//! - [`MethodCaller`]: remote method invocation
//!
//! Every [`Transport`] is also a [`Browser`] and a [`MethodCaller`]; both are
//! expressed as requests on the transport.

mod notification;
mod request;
mod round_trip;

pub use notification::{DataChangeEntry, EventEntry, NotificationBatch};
pub use request::{CreateMonitoredItem, MonitoredItemCreated, Request, Response, SubscriptionCreated};

pub(crate) use round_trip::{round_trip, with_timeout};

use std::future::Future;

use tokio::sync::mpsc;

use crate::browse::{BrowseEntry, BrowseFilter};
use crate::error::{CallError, ProtocolError};
use crate::types::{NodeRef, Variant};

/// A connection to a server, as seen by the subscription engine.
///
/// Implementations are expected to multiplex concurrent requests (several
/// `send_request` futures may be pending at once) and to deliver server
/// pushes on the notification stream independently of request traffic.
pub trait Transport: Send + Sync + 'static {
    /// Sends one request and waits for the matching response.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the request cannot be delivered or the
    /// server rejects it. Rejections are never retried by this crate.
    fn send_request(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Response, ProtocolError>> + Send;

    /// Hands out the stream of notification batches pushed by the server.
    ///
    /// The stream is infinite and cannot be restarted: the first call returns
    /// it, later calls return `None`. A new stream means a new session.
    fn notifications(&self) -> Option<mpsc::Receiver<NotificationBatch>>;
}

/// Lists the children of a node.
pub trait Browser: Send + Sync {
    /// Returns the children of `node` that pass `filter`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the browse request fails.
    fn browse_children(
        &self,
        node: &NodeRef,
        filter: &BrowseFilter,
    ) -> impl Future<Output = Result<Vec<BrowseEntry>, ProtocolError>> + Send;
}

/// Invokes methods on server objects.
pub trait MethodCaller: Send + Sync {
    /// Calls `method` on `object` with the given input arguments.
    ///
    /// # Errors
    ///
    /// Returns `CallError::BadStatus` if the server evaluated the call and
    /// failed it, `CallError::Transport` if the call did not go through.
    fn call_method(
        &self,
        object: &NodeRef,
        method: &NodeRef,
        arguments: Vec<Variant>,
    ) -> impl Future<Output = Result<Vec<Variant>, CallError>> + Send;
}

impl<T: Transport> Browser for T {
    async fn browse_children(
        &self,
        node: &NodeRef,
        filter: &BrowseFilter,
    ) -> Result<Vec<BrowseEntry>, ProtocolError> {
        let request = Request::Browse {
            node: node.clone(),
            filter: filter.clone(),
        };
        match self.send_request(request).await? {
            Response::Browsed(entries) => Ok(entries),
            other => Err(other.unexpected("Browsed")),
        }
    }
}

impl<T: Transport> MethodCaller for T {
    async fn call_method(
        &self,
        object: &NodeRef,
        method: &NodeRef,
        arguments: Vec<Variant>,
    ) -> Result<Vec<Variant>, CallError> {
        let request = Request::Call {
            object: object.clone(),
            method: method.clone(),
            arguments,
        };
        match self.send_request(request).await {
            Ok(Response::Called(outputs)) => Ok(outputs),
            Ok(other) => Err(other.unexpected("Called").into()),
            Err(ProtocolError::Rejected { status, .. }) => Err(CallError::BadStatus(status)),
            Err(e) => Err(e.into()),
        }
    }
}
