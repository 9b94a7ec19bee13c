// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session configuration.
//!
//! Every field has a default, so a configuration file only needs the values
//! it changes. Durations are written in milliseconds.
//!
//! ```json
//! {
//!   "request_timeout": 5000,
//!   "dispatch": { "queue_capacity": 256, "overflow_policy": "reject" },
//!   "subscription": { "publishing_interval": 500, "priority": 1 },
//!   "monitoring": { "sampling_interval": 100, "queue_size": 10 },
//!   "path_cache": true
//! }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatch::OverflowPolicy;
use crate::error::{Error, Result};
use crate::subscription::{MonitoringOptions, SubscriptionSettings};

/// Configuration of a [`Session`](crate::Session).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use uasub_lib::SessionConfig;
/// use uasub_lib::dispatch::OverflowPolicy;
///
/// let config = SessionConfig::default()
///     .with_request_timeout(Duration::from_secs(2))
///     .with_queue_capacity(64)
///     .with_overflow_policy(OverflowPolicy::Reject);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Time budget of every request/response round trip.
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// Notification queue settings.
    pub dispatch: DispatchConfig,
    /// Defaults for new subscriptions.
    pub subscription: SubscriptionSettings,
    /// Defaults for new data change items.
    pub monitoring: MonitoringDefaults,
    /// Whether resolved browse paths are cached.
    pub path_cache: bool,
}

impl SessionConfig {
    /// Default request timeout.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the JSON is malformed or the values fail
    /// [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values for consistency.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request_timeout must be > 0".to_string()));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(Error::Config("dispatch.queue_capacity must be > 0".to_string()));
        }
        if self.subscription.publishing_interval.is_zero() {
            return Err(Error::Config(
                "subscription.publishing_interval must be > 0".to_string(),
            ));
        }
        if self.subscription.max_keep_alive_count == 0 {
            return Err(Error::Config(
                "subscription.max_keep_alive_count must be > 0".to_string(),
            ));
        }
        if self.subscription.lifetime_count < self.subscription.max_keep_alive_count.saturating_mul(3)
        {
            return Err(Error::Config(
                "subscription.lifetime_count must be at least 3 * max_keep_alive_count"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the notification queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.dispatch.queue_capacity = capacity;
        self
    }

    /// Sets the overflow policy of the notification queue.
    #[must_use]
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.dispatch.overflow_policy = policy;
        self
    }

    /// Sets the default subscription settings.
    #[must_use]
    pub fn with_subscription_defaults(mut self, settings: SubscriptionSettings) -> Self {
        self.subscription = settings;
        self
    }

    /// Sets the default monitored item settings.
    #[must_use]
    pub fn with_monitoring_defaults(mut self, monitoring: MonitoringDefaults) -> Self {
        self.monitoring = monitoring;
        self
    }

    /// Enables or disables the browse path cache.
    #[must_use]
    pub fn with_path_cache(mut self, enabled: bool) -> Self {
        self.path_cache = enabled;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            dispatch: DispatchConfig::default(),
            subscription: SubscriptionSettings::default(),
            monitoring: MonitoringDefaults::default(),
            path_cache: true,
        }
    }
}

/// Notification queue settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum number of queued batches.
    pub queue_capacity: usize,
    /// Behavior when the queue is full.
    pub overflow_policy: OverflowPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            overflow_policy: OverflowPolicy::Block,
        }
    }
}

/// Default parameters of new data change items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringDefaults {
    /// Requested sampling interval (`0` lets the server use the publishing interval).
    #[serde(with = "duration_ms")]
    pub sampling_interval: Duration,
    /// Requested server-side queue size.
    pub queue_size: u32,
    /// Whether the server discards the oldest queued value on overflow.
    pub discard_oldest: bool,
}

impl MonitoringDefaults {
    /// Returns item options built from these defaults.
    #[must_use]
    pub fn options(&self) -> MonitoringOptions {
        MonitoringOptions {
            sampling_interval: self.sampling_interval,
            queue_size: self.queue_size,
            discard_oldest: self.discard_oldest,
            ..MonitoringOptions::default()
        }
    }
}

impl Default for MonitoringDefaults {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::ZERO,
            queue_size: 1,
            discard_oldest: true,
        }
    }
}

/// Serializes a [`Duration`] as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
