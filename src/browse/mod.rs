// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Browsing and browse path resolution.
//!
//! Browsing itself is provided by the external [`Browser`](crate::protocol::Browser);
//! this module defines its filter and result types and the
//! [`PathResolver`] that walks a [`BrowsePath`](crate::types::BrowsePath) one
//! segment at a time.

mod resolver;

pub use resolver::PathResolver;

use serde::{Deserialize, Serialize};

use crate::types::{NodeClass, NodeRef, QualifiedName};

/// Selects which children a browse returns.
///
/// An empty filter returns every child.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BrowseFilter {
    /// Only children with this browse name.
    pub browse_name: Option<QualifiedName>,
    /// Only children of this class.
    pub node_class: Option<NodeClass>,
}

impl BrowseFilter {
    /// Matches every child.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches children with the given browse name.
    #[must_use]
    pub fn named(browse_name: QualifiedName) -> Self {
        Self {
            browse_name: Some(browse_name),
            node_class: None,
        }
    }

    /// Restricts the filter to one node class.
    #[must_use]
    pub fn with_node_class(mut self, node_class: NodeClass) -> Self {
        self.node_class = Some(node_class);
        self
    }

    /// Returns `true` if `entry` passes the filter.
    #[must_use]
    pub fn matches(&self, entry: &BrowseEntry) -> bool {
        self.browse_name
            .as_ref()
            .is_none_or(|name| *name == entry.browse_name)
            && self.node_class.is_none_or(|class| class == entry.node_class)
    }
}

/// One child returned by a browse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrowseEntry {
    /// Namespace-qualified browse name.
    pub browse_name: QualifiedName,
    /// The child node.
    pub node: NodeRef,
    /// Class of the child.
    pub node_class: NodeClass,
    /// Human-readable name.
    pub display_name: String,
}

impl BrowseEntry {
    /// Creates an entry whose display name is the browse name.
    #[must_use]
    pub fn new(browse_name: QualifiedName, node: NodeRef, node_class: NodeClass) -> Self {
        Self {
            display_name: browse_name.name().to_string(),
            browse_name,
            node,
            node_class,
        }
    }
}
