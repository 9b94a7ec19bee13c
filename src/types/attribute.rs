// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node attributes and node classes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Identifies one attribute of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttributeId {
    /// `NodeId` (1).
    NodeId,
    /// `NodeClass` (2).
    NodeClass,
    /// `BrowseName` (3).
    BrowseName,
    /// `DisplayName` (4).
    DisplayName,
    /// `Description` (5).
    Description,
    /// `EventNotifier` (12).
    EventNotifier,
    /// `Value` (13).
    #[default]
    Value,
    /// `DataType` (14).
    DataType,
    /// `AccessLevel` (17).
    AccessLevel,
    /// `Executable` (21).
    Executable,
}

impl AttributeId {
    /// Returns the numeric attribute id.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::NodeId => 1,
            Self::NodeClass => 2,
            Self::BrowseName => 3,
            Self::DisplayName => 4,
            Self::Description => 5,
            Self::EventNotifier => 12,
            Self::Value => 13,
            Self::DataType => 14,
            Self::AccessLevel => 17,
            Self::Executable => 21,
        }
    }
}

impl TryFrom<u32> for AttributeId {
    type Error = ValueError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        Ok(match id {
            1 => Self::NodeId,
            2 => Self::NodeClass,
            3 => Self::BrowseName,
            4 => Self::DisplayName,
            5 => Self::Description,
            12 => Self::EventNotifier,
            13 => Self::Value,
            14 => Self::DataType,
            17 => Self::AccessLevel,
            21 => Self::Executable,
            other => return Err(ValueError::UnknownAttribute(other)),
        })
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The class of a node in the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    /// An object (folder, device, server...).
    Object,
    /// A variable holding a value.
    Variable,
    /// A callable method.
    Method,
    /// An object type definition.
    ObjectType,
    /// A variable type definition.
    VariableType,
    /// A reference type definition.
    ReferenceType,
    /// A data type definition.
    DataType,
    /// A view.
    View,
}
