// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node helpers bound to a session.

use std::fmt;

use crate::browse::{BrowseEntry, BrowseFilter};
use crate::error::{BrowseError, ProtocolError, Result, ValueError};
use crate::protocol::Transport;
use crate::types::{AttributeId, BrowsePath, DataValue, NodeClass, NodeRef, QualifiedName, Variant};

use super::Session;

/// The standard entry points of the address space.
pub struct Nodes<'a, T: Transport> {
    session: &'a Session<T>,
}

impl<T: Transport> Clone for Nodes<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Transport> Copy for Nodes<'_, T> {}

impl<'a, T: Transport> Nodes<'a, T> {
    pub(super) fn new(session: &'a Session<T>) -> Self {
        Self { session }
    }

    /// The `Root` folder.
    #[must_use]
    pub fn root(&self) -> Node<'a, T> {
        Node::new(self.session, NodeRef::root())
    }

    /// The `Objects` folder.
    #[must_use]
    pub fn objects(&self) -> Node<'a, T> {
        Node::new(self.session, NodeRef::objects())
    }

    /// The `Types` folder.
    #[must_use]
    pub fn types(&self) -> Node<'a, T> {
        Node::new(self.session, NodeRef::types())
    }

    /// The `Views` folder.
    #[must_use]
    pub fn views(&self) -> Node<'a, T> {
        Node::new(self.session, NodeRef::views())
    }

    /// The `Server` object.
    #[must_use]
    pub fn server(&self) -> Node<'a, T> {
        Node::new(self.session, NodeRef::server())
    }
}

/// A [`NodeRef`] together with the session it is read through.
pub struct Node<'a, T: Transport> {
    session: &'a Session<T>,
    node: NodeRef,
}

impl<T: Transport> Clone for Node<'_, T> {
    fn clone(&self) -> Self {
        Self {
            session: self.session,
            node: self.node.clone(),
        }
    }
}

impl<'a, T: Transport> Node<'a, T> {
    pub(super) fn new(session: &'a Session<T>, node: NodeRef) -> Self {
        Self { session, node }
    }

    /// Returns the node reference.
    #[must_use]
    pub fn node_ref(&self) -> &NodeRef {
        &self.node
    }

    /// Consumes the helper and returns the node reference.
    #[must_use]
    pub fn into_node_ref(self) -> NodeRef {
        self.node
    }

    // ========== Navigation ==========

    /// Lists every child.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` or `Error::Timeout` if the browse fails.
    pub async fn children(&self) -> Result<Vec<BrowseEntry>> {
        self.session.browse(&self.node, BrowseFilter::all()).await
    }

    /// Resolves a child path given as `ns:Name` segments.
    ///
    /// ```ignore
    /// let var = session
    ///     .nodes()
    ///     .root()
    ///     .child(["0:Objects", "2:MyObject", "2:MyVariable"])
    ///     .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// - `Error::Value` if a segment is malformed or the list is empty
    /// - see [`Session::resolve`] for resolution failures
    pub async fn child<I, S>(&self, segments: I) -> Result<Node<'a, T>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = BrowsePath::from_segments(segments)?;
        self.resolve(&path).await
    }

    /// Resolves `path` relative to this node.
    ///
    /// # Errors
    ///
    /// See [`Session::resolve`].
    pub async fn resolve(&self, path: &BrowsePath) -> Result<Node<'a, T>> {
        let node = self.session.resolve(&self.node, path).await?;
        Ok(Node::new(self.session, node))
    }

    // ========== Attributes ==========

    /// Reads the value.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` if the read fails or the value carries a bad
    /// status.
    pub async fn read_value(&self) -> Result<Variant> {
        let value = self.read_data_value().await?;
        if value.status.is_bad() {
            return Err(ProtocolError::rejected(value.status, format!("read {}", self.node)).into());
        }
        Ok(value.value)
    }

    /// Reads the value with its status and timestamps.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` or `Error::Timeout` if the read fails.
    pub async fn read_data_value(&self) -> Result<DataValue> {
        self.read_attribute(AttributeId::Value).await
    }

    /// Reads any attribute.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` or `Error::Timeout` if the read fails.
    pub async fn read_attribute(&self, attribute: AttributeId) -> Result<DataValue> {
        self.session.read(&self.node, attribute).await
    }

    /// Writes the value.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` or `Error::Timeout` if the write fails.
    pub async fn write_value(&self, value: impl Into<Variant>) -> Result<()> {
        self.session
            .write(&self.node, AttributeId::Value, value.into())
            .await
    }

    /// Reads the browse name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Value` if the attribute is not a qualified name string.
    pub async fn browse_name(&self) -> Result<QualifiedName> {
        let value = self.read_attribute(AttributeId::BrowseName).await?;
        let text = value.value.as_str().ok_or(ValueError::TypeMismatch {
            expected: "String",
            actual: value.value.type_name(),
        })?;
        Ok(text.parse()?)
    }

    // ========== Methods ==========

    /// Calls the method child with the given browse name, e.g. `"2:multiply"`.
    ///
    /// # Errors
    ///
    /// - `Error::Browse` if this node has no such method, or several
    /// - `Error::Method` if the call fails
    pub async fn call_method(&self, method: &str, arguments: Vec<Variant>) -> Result<Vec<Variant>> {
        let name: QualifiedName = method.parse()?;
        let filter = BrowseFilter::named(name.clone()).with_node_class(NodeClass::Method);
        let mut methods = self.session.browse(&self.node, filter.clone()).await?;
        methods.retain(|entry| filter.matches(entry));

        let method_node = match methods.len() {
            1 => methods.remove(0).node,
            count => {
                let path = BrowsePath::new(vec![name.clone()])?;
                let err = if count == 0 {
                    BrowseError::NotFound {
                        path,
                        segment: name,
                    }
                } else {
                    BrowseError::Ambiguous {
                        path,
                        segment: name,
                        matches: count,
                    }
                };
                return Err(err.into());
            }
        };
        self.call_method_ref(&method_node, arguments).await
    }

    /// Calls a method by node reference, with this node as the object.
    ///
    /// # Errors
    ///
    /// Returns `Error::Method` if the call fails.
    pub async fn call_method_ref(
        &self,
        method: &NodeRef,
        arguments: Vec<Variant>,
    ) -> Result<Vec<Variant>> {
        self.session.call_method(&self.node, method, arguments).await
    }
}

impl<T: Transport> fmt::Debug for Node<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("node", &self.node).finish_non_exhaustive()
    }
}

impl<T: Transport> fmt::Display for Node<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node)
    }
}
