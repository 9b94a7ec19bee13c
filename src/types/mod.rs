// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types of the information model.
//!
//! # Types
//!
//! - [`NodeRef`] - Immutable identifier of a node (`ns=2;i=1002`)
//! - [`QualifiedName`] / [`BrowsePath`] - Namespace-qualified names (`2:MyObject`)
//! - [`Variant`] / [`DataValue`] - Attribute values and sampled values
//! - [`StatusCode`] - Server status codes
//! - [`AttributeId`] / [`NodeClass`] - Attribute and node class enumerations
//! - [`SessionId`] - Client-side session identifier

mod attribute;
mod node_ref;
mod qualified_name;
mod session_id;
mod status;
mod variant;

pub use attribute::{AttributeId, NodeClass};
pub use node_ref::{Identifier, NodeRef};
pub use qualified_name::{BrowsePath, QualifiedName};
pub use session_id::SessionId;
pub use status::StatusCode;
pub use variant::{DataValue, Variant};
