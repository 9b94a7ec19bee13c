// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Notification delivery path.
//!
//! ```text
//! transport stream ──▶ pump task ──▶ bounded queue ──▶ "uasub-dispatch" thread
//!                                                          │
//!                                    NotificationRouter ◀──┘
//!                                    (subscription table)
//!                                          │
//!                                          ▼
//!                                   Handler callbacks
//! ```
//!
//! - [`NotificationDispatcher`] - the queue and its delivery thread
//! - [`NotificationRouter`] - resolves a batch to a subscription and its items
//! - [`DispatchObserver`] - injected sink for drops, gaps and handler faults
//! - [`DispatchStats`] - counters, read through [`DispatchStatsSnapshot`]

mod context;
mod dispatcher;
mod observer;
mod stats;

pub use context::{DeliveryContext, NotificationRouter};
pub use dispatcher::{NotificationDispatcher, OverflowPolicy};
pub use observer::{Callback, DispatchObserver, DropReason, FaultKind, HandlerFault, TracingObserver};
pub use stats::{DispatchStats, DispatchStatsSnapshot};

pub(crate) use context::invoke_guarded;
