// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `uasub` Lib - Client-side subscription and notification engine for OPC UA-style servers.
//!
//! This library manages subscriptions and monitored items on top of an
//! external protocol stack, and delivers the notifications the server pushes
//! to user handlers in order, on a dedicated thread.
//!
//! # Supported Features
//!
//! - **Subscriptions**: Create, modify, enable/disable publishing, delete
//! - **Monitored items**: Data change and event items with client handles
//! - **Delivery**: Bounded queue, ordered delivery, sequence gap detection,
//!   handler fault isolation
//! - **Address space**: Browse path resolution with caching, reads, writes,
//!   namespace lookup, method calls
//!
//! # Architecture
//!
//! ```text
//! Session ──▶ SubscriptionManager ──▶ Subscription ──▶ MonitoredItemRegistry
//!    │                │
//!    │                └── routing table ◀── NotificationDispatcher ◀── pump ◀── Transport
//!    └── PathResolver ──▶ Browser
//! ```
//!
//! The wire protocol is not part of this crate. Anything that implements
//! [`protocol::Transport`] can drive a [`Session`]; [`testing::MockServer`]
//! is an in-memory implementation.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use uasub_lib::subscription::{DataChangeMeta, EventNotification, Handler, HandlerResult};
//! use uasub_lib::testing::MockServer;
//! use uasub_lib::types::{NodeRef, Variant};
//! use uasub_lib::{Session, SessionConfig};
//!
//! struct Printer;
//!
//! impl Handler for Printer {
//!     fn on_data_change(&self, node: &NodeRef, value: &Variant, _meta: &DataChangeMeta) -> HandlerResult {
//!         println!("New data change event {node} {value:?}");
//!         Ok(())
//!     }
//!
//!     fn on_event(&self, event: &EventNotification) -> HandlerResult {
//!         println!("New event {:?}", event.get("Message"));
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> uasub_lib::Result<()> {
//!     let session = Session::connect(MockServer::new(), SessionConfig::default())?;
//!
//!     let var = session
//!         .nodes()
//!         .root()
//!         .child(["0:Objects", "2:MyObject", "2:MyVariable"])
//!         .await?;
//!
//!     let sub = session.create_subscription(Duration::from_millis(500), Printer).await?;
//!     let handle = sub.subscribe_data_change(var.node_ref()).await?;
//!     sub.subscribe_events().await?;
//!
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!
//!     sub.unsubscribe(handle).await?;
//!     sub.delete().await?;
//!     session.close().await
//! }
//! ```

pub mod browse;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod session;
pub mod subscription;
pub mod testing;
pub mod types;

pub use browse::{BrowseEntry, BrowseFilter, PathResolver};
pub use config::{DispatchConfig, MonitoringDefaults, SessionConfig};
pub use dispatch::{DispatchObserver, DispatchStatsSnapshot, NotificationDispatcher, OverflowPolicy};
pub use error::{BrowseError, CallError, Error, ProtocolError, Result, ValueError};
pub use session::{Node, Nodes, Session};
pub use subscription::{
    ClientHandle, DataChangeMeta, EventFilter, EventNotification, Handler, HandlerResult,
    MonitoringOptions, Subscription, SubscriptionId, SubscriptionManager, SubscriptionSettings,
    SubscriptionState,
};
pub use types::{AttributeId, BrowsePath, DataValue, NodeRef, QualifiedName, StatusCode, Variant};
