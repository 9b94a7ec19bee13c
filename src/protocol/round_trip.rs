// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded request/response round trips.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

use super::{Request, Response, Transport};

/// Sends `request` and waits at most `timeout` for the response.
///
/// A request that times out may still have been carried out by the server.
/// Callers must not register any local state for it.
///
/// # Errors
///
/// Returns `Error::Timeout` if the budget is exceeded, `Error::Protocol` if the
/// transport fails or the server rejects the request.
pub(crate) async fn round_trip<T>(
    transport: &T,
    request: Request,
    timeout: Duration,
) -> Result<Response>
where
    T: Transport + ?Sized,
{
    let kind = request.kind();
    tracing::trace!(request = kind, "Sending request");
    let response = with_timeout(timeout, transport.send_request(request))
        .await
        .inspect_err(|e| tracing::debug!(request = kind, error = %e, "Request failed"))?;
    tracing::trace!(request = kind, response = response.kind(), "Received response");
    Ok(response)
}

/// Awaits `operation` with a time budget.
///
/// # Errors
///
/// Returns `Error::Timeout` if the budget is exceeded, or the operation's own
/// error converted into [`Error`].
pub(crate) async fn with_timeout<F, R, E>(timeout: Duration, operation: F) -> Result<R>
where
    F: Future<Output = std::result::Result<R, E>>,
    Error: From<E>,
{
    #[allow(clippy::cast_possible_truncation)]
    let timeout_ms = timeout.as_millis() as u64;

    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| Error::Timeout(timeout_ms))?
        .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    #[tokio::test(start_paused = true)]
    async fn with_timeout_reports_budget_in_millis() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ProtocolError>(())
        };
        let err = with_timeout(Duration::from_millis(250), slow).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(250)));
    }

    #[tokio::test]
    async fn with_timeout_converts_inner_error() {
        let failing = async { Err::<(), _>(ProtocolError::ChannelClosed("gone".to_string())) };
        let err = with_timeout(Duration::from_secs(1), failing).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::ChannelClosed(_))));
    }
}
