// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `uasub` library.
//!
//! Errors that originate in a request/response call (creating a subscription,
//! registering a monitored item, browsing, calling a method) are returned to
//! the caller that issued the call. Failures that happen while notifications
//! are being delivered never show up here: they are reported to the
//! [`DispatchObserver`](crate::dispatch::DispatchObserver) instead.

use thiserror::Error;

use crate::subscription::{ClientHandle, SubscriptionId};
use crate::types::{BrowsePath, QualifiedName, StatusCode};

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport or the server rejected a request.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Browse path resolution failed.
    #[error("browse error: {0}")]
    Browse(#[from] BrowseError),

    /// A value could not be constructed or parsed.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// A method call failed.
    #[error("method call failed: {0}")]
    Method(#[from] CallError),

    /// A round trip exceeded its time budget.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The handle is not registered on the subscription.
    #[error("unknown monitored item handle {handle} on {subscription}")]
    UnknownHandle {
        /// The subscription that was asked.
        subscription: SubscriptionId,
        /// The handle that was not found.
        handle: ClientHandle,
    },

    /// The subscription has been deleted.
    #[error("{0} has already been deleted")]
    AlreadyDeleted(SubscriptionId),

    /// The subscription is being deleted; no new item operations are accepted.
    #[error("{0} is being deleted")]
    Deleting(SubscriptionId),

    /// The notification queue is full and the overflow policy rejects new batches.
    #[error("notification queue is full")]
    QueueFull,

    /// The notification dispatcher is no longer running.
    #[error("notification dispatcher has stopped")]
    DispatcherStopped,

    /// The notification dispatcher thread could not be started.
    #[error("failed to start notification dispatcher: {0}")]
    DispatcherSpawn(#[source] std::io::Error),

    /// No tokio runtime is available to run the session's tasks.
    #[error("no tokio runtime: {0}")]
    Runtime(String),

    /// The session configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors reported by the transport for a single request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The server answered with a bad status code.
    #[error("{context} rejected with {status}")]
    Rejected {
        /// Status returned by the server.
        status: StatusCode,
        /// Short description of the rejected request.
        context: String,
    },

    /// Connection to the server failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// The response does not match the request that was sent.
    #[error("expected {expected} response, got {actual}")]
    UnexpectedResponse {
        /// The response kind the request calls for.
        expected: &'static str,
        /// The response kind that arrived.
        actual: &'static str,
    },

    /// The server returned a subscription id that is already live in this session.
    #[error("server reused live subscription id {0}")]
    DuplicateSubscriptionId(u32),
}

impl ProtocolError {
    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(status: StatusCode, context: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            context: context.into(),
        }
    }

    /// Returns the server status code if this is a rejection.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors raised while resolving a [`BrowsePath`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrowseError {
    /// No child matches a path segment.
    #[error("no child named {segment} while resolving {path}")]
    NotFound {
        /// The full path being resolved.
        path: BrowsePath,
        /// The segment that had no match.
        segment: QualifiedName,
    },

    /// More than one child matches a path segment.
    #[error("{matches} children named {segment} while resolving {path}")]
    Ambiguous {
        /// The full path being resolved.
        path: BrowsePath,
        /// The segment with several matches.
        segment: QualifiedName,
        /// Number of matching children.
        matches: usize,
    },
}

/// Errors related to value construction and parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A node id string could not be parsed.
    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    /// A qualified name string could not be parsed.
    #[error("invalid qualified name: {0}")]
    InvalidQualifiedName(String),

    /// A browse path is empty or malformed.
    #[error("invalid browse path: {0}")]
    InvalidBrowsePath(String),

    /// An attribute id is not known.
    #[error("unknown attribute id {0}")]
    UnknownAttribute(u32),

    /// The value has an unexpected type.
    #[error("expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected variant type.
        expected: &'static str,
        /// The variant type that was found.
        actual: &'static str,
    },

    /// The client handle space of a subscription is used up.
    #[error("client handle space exhausted")]
    HandlesExhausted,

    /// The namespace URI is not in the server namespace array.
    #[error("namespace {0} is not known to the server")]
    UnknownNamespace(String),
}

/// Errors reported by a method call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The server evaluated the call and returned a bad status.
    #[error("method returned {0}")]
    BadStatus(StatusCode),

    /// The call could not be carried out.
    #[error(transparent)]
    Transport(#[from] ProtocolError),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_display() {
        let err = ProtocolError::rejected(StatusCode::BAD_NODE_ID_UNKNOWN, "create monitored item");
        assert_eq!(
            err.to_string(),
            "create monitored item rejected with BadNodeIdUnknown (0x80340000)"
        );
        assert_eq!(err.status(), Some(StatusCode::BAD_NODE_ID_UNKNOWN));
    }

    #[test]
    fn error_from_protocol_error() {
        let err: Error = ProtocolError::ConnectionFailed("reset".to_string()).into();
        assert!(matches!(err, Error::Protocol(ProtocolError::ConnectionFailed(_))));
    }

    #[test]
    fn unknown_handle_display() {
        let err = Error::UnknownHandle {
            subscription: SubscriptionId::new(7),
            handle: ClientHandle::new(3),
        };
        assert_eq!(err.to_string(), "unknown monitored item handle 3 on Sub(7)");
    }

    #[test]
    fn browse_error_display() {
        let path: BrowsePath = "0:Objects/2:Missing".parse().unwrap();
        let err = BrowseError::NotFound {
            segment: path.segments()[1].clone(),
            path,
        };
        assert_eq!(
            err.to_string(),
            "no child named 2:Missing while resolving 0:Objects/2:Missing"
        );
    }

    #[test]
    fn call_error_from_protocol_error() {
        let err: CallError = ProtocolError::ChannelClosed("gone".to_string()).into();
        assert_eq!(err.to_string(), "channel closed: gone");
    }
}
