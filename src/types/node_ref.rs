// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node identifiers.
//!
//! A [`NodeRef`] names one entity in the remote address space. It is a plain
//! value: two `NodeRef`s are equal when namespace and identifier are equal,
//! and nothing about it changes after construction.

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValueError;

/// The identifier part of a [`NodeRef`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identifier {
    /// Numeric identifier (`i=`).
    Numeric(u32),
    /// String identifier (`s=`).
    String(String),
    /// GUID identifier (`g=`).
    Guid(Uuid),
    /// Opaque byte string identifier (`b=`), written as hex.
    Opaque(Vec<u8>),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "i={n}"),
            Self::String(s) => write!(f, "s={s}"),
            Self::Guid(g) => write!(f, "g={g}"),
            Self::Opaque(bytes) => {
                let mut hex = String::with_capacity(bytes.len() * 2);
                for b in bytes {
                    let _ = write!(hex, "{b:02x}");
                }
                write!(f, "b={hex}")
            }
        }
    }
}

/// Immutable reference to a node in the remote address space.
///
/// # Examples
///
/// ```
/// use uasub_lib::types::NodeRef;
///
/// let var = NodeRef::numeric(2, 1002);
/// assert_eq!(var.to_string(), "ns=2;i=1002");
///
/// let parsed: NodeRef = "ns=2;s=MyVariable".parse().unwrap();
/// assert_eq!(parsed, NodeRef::string(2, "MyVariable"));
///
/// // Namespace 0 may be omitted
/// let objects: NodeRef = "i=85".parse().unwrap();
/// assert_eq!(objects, NodeRef::numeric(0, 85));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    namespace: u16,
    identifier: Identifier,
}

impl NodeRef {
    /// Creates a node reference from its parts.
    #[must_use]
    pub const fn new(namespace: u16, identifier: Identifier) -> Self {
        Self {
            namespace,
            identifier,
        }
    }

    /// Creates a numeric node reference.
    #[must_use]
    pub const fn numeric(namespace: u16, id: u32) -> Self {
        Self::new(namespace, Identifier::Numeric(id))
    }

    /// Creates a string node reference.
    #[must_use]
    pub fn string(namespace: u16, id: impl Into<String>) -> Self {
        Self::new(namespace, Identifier::String(id.into()))
    }

    /// Creates a GUID node reference.
    #[must_use]
    pub const fn guid(namespace: u16, id: Uuid) -> Self {
        Self::new(namespace, Identifier::Guid(id))
    }

    /// Creates an opaque node reference.
    #[must_use]
    pub fn opaque(namespace: u16, id: impl Into<Vec<u8>>) -> Self {
        Self::new(namespace, Identifier::Opaque(id.into()))
    }

    /// Returns the namespace index.
    #[must_use]
    pub const fn namespace(&self) -> u16 {
        self.namespace
    }

    /// Returns the identifier.
    #[must_use]
    pub const fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// The `Root` folder (`i=84`).
    #[must_use]
    pub const fn root() -> Self {
        Self::numeric(0, 84)
    }

    /// The `Objects` folder (`i=85`).
    #[must_use]
    pub const fn objects() -> Self {
        Self::numeric(0, 85)
    }

    /// The `Types` folder (`i=86`).
    #[must_use]
    pub const fn types() -> Self {
        Self::numeric(0, 86)
    }

    /// The `Views` folder (`i=87`).
    #[must_use]
    pub const fn views() -> Self {
        Self::numeric(0, 87)
    }

    /// The `Server` object (`i=2253`), the default event notifier.
    #[must_use]
    pub const fn server() -> Self {
        Self::numeric(0, 2253)
    }

    /// The server's `NamespaceArray` variable (`i=2255`).
    #[must_use]
    pub const fn namespace_array() -> Self {
        Self::numeric(0, 2255)
    }

    /// The `BaseEventType` type definition (`i=2041`).
    #[must_use]
    pub const fn base_event_type() -> Self {
        Self::numeric(0, 2041)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns={};{}", self.namespace, self.identifier)
    }
}

impl FromStr for NodeRef {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValueError::InvalidNodeId(s.to_string());

        let (namespace, rest) = match s.strip_prefix("ns=") {
            Some(tail) => {
                let (ns, rest) = tail.split_once(';').ok_or_else(invalid)?;
                (ns.parse::<u16>().map_err(|_| invalid())?, rest)
            }
            None => (0, s),
        };

        let (kind, value) = rest.split_once('=').ok_or_else(invalid)?;
        let identifier = match kind {
            "i" => Identifier::Numeric(value.parse().map_err(|_| invalid())?),
            "s" => Identifier::String(value.to_string()),
            "g" => Identifier::Guid(Uuid::parse_str(value).map_err(|_| invalid())?),
            "b" => Identifier::Opaque(parse_hex(value).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        };

        Ok(Self::new(namespace, identifier))
    }
}

impl From<u32> for NodeRef {
    fn from(id: u32) -> Self {
        Self::numeric(0, id)
    }
}

fn parse_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(value.get(i..i + 2)?, 16).ok())
        .collect()
}
