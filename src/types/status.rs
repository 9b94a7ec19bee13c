// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Status codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-bit status code. The two high bits carry the severity.
///
/// # Examples
///
/// ```
/// use uasub_lib::types::StatusCode;
///
/// assert!(StatusCode::GOOD.is_good());
/// assert!(StatusCode::BAD_NODE_ID_UNKNOWN.is_bad());
/// assert_eq!(StatusCode::BAD_TIMEOUT.to_string(), "BadTimeout (0x800A0000)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(u32);

impl StatusCode {
    /// The operation succeeded.
    pub const GOOD: Self = Self(0);
    /// The value is uncertain.
    pub const UNCERTAIN: Self = Self(0x4000_0000);
    /// Generic bad status.
    pub const BAD: Self = Self(0x8000_0000);
    /// The operation timed out.
    pub const BAD_TIMEOUT: Self = Self(0x800A_0000);
    /// The subscription id is not valid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: Self = Self(0x8028_0000);
    /// The node id refers to a node that does not exist.
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    /// The attribute is not supported for the node.
    pub const BAD_ATTRIBUTE_ID_INVALID: Self = Self(0x8035_0000);
    /// The access level does not allow writing.
    pub const BAD_NOT_WRITABLE: Self = Self(0x803B_0000);
    /// The monitored item id does not refer to a valid item.
    pub const BAD_MONITORED_ITEM_ID_INVALID: Self = Self(0x8042_0000);
    /// The value supplied has the wrong type.
    pub const BAD_TYPE_MISMATCH: Self = Self(0x8074_0000);
    /// The method id does not refer to a method of the object.
    pub const BAD_METHOD_INVALID: Self = Self(0x8075_0000);
    /// Not enough input arguments were supplied.
    pub const BAD_ARGUMENTS_MISSING: Self = Self(0x8076_0000);
    /// The server has reached its subscription limit.
    pub const BAD_TOO_MANY_SUBSCRIPTIONS: Self = Self(0x8077_0000);
    /// An argument is not valid.
    pub const BAD_INVALID_ARGUMENT: Self = Self(0x80AB_0000);

    /// Creates a status code from its raw value.
    #[must_use]
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` for good severity.
    #[must_use]
    pub const fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` for uncertain severity.
    #[must_use]
    pub const fn is_uncertain(self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    /// Returns `true` for bad severity.
    #[must_use]
    pub const fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the symbolic name of well-known codes.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::GOOD => "Good",
            Self::UNCERTAIN => "Uncertain",
            Self::BAD => "Bad",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_SUBSCRIPTION_ID_INVALID => "BadSubscriptionIdInvalid",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_ATTRIBUTE_ID_INVALID => "BadAttributeIdInvalid",
            Self::BAD_NOT_WRITABLE => "BadNotWritable",
            Self::BAD_MONITORED_ITEM_ID_INVALID => "BadMonitoredItemIdInvalid",
            Self::BAD_TYPE_MISMATCH => "BadTypeMismatch",
            Self::BAD_METHOD_INVALID => "BadMethodInvalid",
            Self::BAD_ARGUMENTS_MISSING => "BadArgumentsMissing",
            Self::BAD_TOO_MANY_SUBSCRIPTIONS => "BadTooManySubscriptions",
            Self::BAD_INVALID_ARGUMENT => "BadInvalidArgument",
            _ => return None,
        })
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08X})", self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bits() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::GOOD.is_bad());
        assert!(StatusCode::UNCERTAIN.is_uncertain());
        assert!(!StatusCode::UNCERTAIN.is_good());
        assert!(StatusCode::BAD_MONITORED_ITEM_ID_INVALID.is_bad());
    }

    #[test]
    fn display_unknown_code() {
        assert_eq!(StatusCode::new(0x8123_0000).to_string(), "0x81230000");
    }
}
