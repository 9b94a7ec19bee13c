// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscriptions and monitored items.
//!
//! # Ownership
//!
//! ```text
//! SubscriptionManager ──1:N──▶ Subscription ──1:N──▶ MonitoredItem ──N:1──▶ NodeRef
//!        │                          │
//!        └── routing table ◀────────┘ (keyed by server-assigned SubscriptionId)
//! ```
//!
//! A [`Subscription`] moves through
//! `Created → Active → Deleting → Deleted` (see [`SubscriptionState`]).
//! Monitored items are keyed by a [`ClientHandle`] drawn from a per-subscription
//! monotonic counter, so a handle is never reused while its subscription lives.
//!
//! # Example
//!
//! ```ignore
//! let sub = session.create_subscription(Duration::from_millis(500), handler).await?;
//! let handle = sub.subscribe_data_change(&node).await?;
//! // ...
//! sub.unsubscribe(handle).await?;
//! sub.delete().await?;
//! ```

mod filter;
mod handler;
mod ids;
mod item;
mod live;
mod manager;
mod registry;
mod sequence;
mod settings;
mod state;

pub use filter::{DataChangeFilter, DataChangeTrigger, Deadband, EventFilter, ItemFilter};
pub use handler::{DataChangeMeta, EventNotification, Handler, HandlerError, HandlerResult};
pub use ids::{ClientHandle, MonitoredItemId, SubscriptionId};
pub use item::{MonitoredItem, MonitoredTarget, MonitoringOptions};
pub use live::Subscription;
pub use manager::SubscriptionManager;
pub use registry::MonitoredItemRegistry;
pub use sequence::{SequenceCheck, SequenceTracker};
pub use settings::{RevisedSettings, SubscriptionSettings};
pub use state::SubscriptionState;
