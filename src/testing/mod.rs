// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory server and recording handler for tests.
//!
//! # Features
//!
//! - [`MockServer`]: a [`Transport`](crate::protocol::Transport) with a small
//!   address space, live subscription bookkeeping, method callbacks and
//!   failure injection
//! - [`RecordingHandler`]: a [`Handler`](crate::subscription::Handler) that
//!   records every callback and can be told to fail or panic
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use uasub_lib::protocol::NotificationBatch;
//! use uasub_lib::testing::{MockServer, RecordingHandler};
//! use uasub_lib::types::{DataValue, NodeRef, QualifiedName};
//! use uasub_lib::{Session, SessionConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> uasub_lib::Result<()> {
//! let server = MockServer::new();
//! let var = server.add_variable(
//!     &NodeRef::objects(),
//!     NodeRef::numeric(2, 2),
//!     QualifiedName::new(2, "MyVariable"),
//!     1_i32,
//! );
//!
//! let session = Session::connect(server.clone(), SessionConfig::default())?;
//! let handler = RecordingHandler::new();
//! let sub = session
//!     .create_subscription(Duration::from_millis(500), handler.clone())
//!     .await?;
//! let handle = sub.subscribe_data_change(&var).await?;
//!
//! let batch = NotificationBatch::new(sub.id(), 1).with_data_change(handle, DataValue::new(2_i32));
//! server.push(batch).await?;
//! assert!(handler.wait_for_calls(1, Duration::from_secs(1)).await);
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

mod mock_server;
mod recording;

pub use mock_server::{MethodCallback, MockServer};
pub use recording::{Recorded, RecordingHandler};
