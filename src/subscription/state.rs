// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscription lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::SubscriptionId;

/// Lifecycle state of a subscription.
///
/// ```text
/// Created ──▶ Active ──▶ Deleting ──▶ Deleted
///                ▲           │
///                └───────────┘  (delete request failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SubscriptionState {
    /// The server confirmed creation; the local entry is not routable yet.
    #[default]
    Created,
    /// Routable; monitored items can be added and removed.
    Active,
    /// A delete round trip is in flight.
    Deleting,
    /// Terminal.
    Deleted,
}

impl SubscriptionState {
    /// Returns `true` if item operations are accepted.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` if the subscription is in its terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Checks that an operation may start in this state.
    ///
    /// # Errors
    ///
    /// Returns `Error::Deleting` while a delete is in flight and
    /// `Error::AlreadyDeleted` once deleted.
    pub fn ensure_operable(self, id: SubscriptionId) -> Result<()> {
        match self {
            Self::Created | Self::Active => Ok(()),
            Self::Deleting => Err(Error::Deleting(id)),
            Self::Deleted => Err(Error::AlreadyDeleted(id)),
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Active => write!(f, "Active"),
            Self::Deleting => write!(f, "Deleting"),
            Self::Deleted => write!(f, "Deleted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operable_states() {
        let id = SubscriptionId::new(1);
        assert!(SubscriptionState::Created.ensure_operable(id).is_ok());
        assert!(SubscriptionState::Active.ensure_operable(id).is_ok());
        assert!(matches!(
            SubscriptionState::Deleting.ensure_operable(id),
            Err(Error::Deleting(_))
        ));
        assert!(matches!(
            SubscriptionState::Deleted.ensure_operable(id),
            Err(Error::AlreadyDeleted(_))
        ));
    }

    #[test]
    fn terminal_state() {
        assert!(SubscriptionState::Deleted.is_terminal());
        assert!(!SubscriptionState::Deleting.is_terminal());
        assert_eq!(SubscriptionState::Deleting.to_string(), "Deleting");
    }
}
