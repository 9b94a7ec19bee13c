// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Requested and revised subscription parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_ms;

/// Parameters requested when creating or modifying a subscription.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use uasub_lib::subscription::SubscriptionSettings;
///
/// let settings = SubscriptionSettings::default()
///     .with_publishing_interval(Duration::from_millis(250))
///     .with_priority(10);
/// assert_eq!(settings.publishing_interval, Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionSettings {
    /// Target interval between publish cycles.
    #[serde(with = "duration_ms")]
    pub publishing_interval: Duration,
    /// Publish cycles without a client request before the server drops the subscription.
    pub lifetime_count: u32,
    /// Empty publish cycles before the server sends a keep-alive.
    pub max_keep_alive_count: u32,
    /// Upper bound of entries per notification batch (`0` means unlimited).
    pub max_notifications_per_publish: u32,
    /// Relative priority among the session's subscriptions.
    pub priority: u8,
    /// Whether the server publishes right after creation.
    pub publishing_enabled: bool,
}

impl SubscriptionSettings {
    /// Default target publishing interval.
    pub const DEFAULT_PUBLISHING_INTERVAL: Duration = Duration::from_millis(500);

    /// Creates settings with the given interval and default counts.
    #[must_use]
    pub fn new(publishing_interval: Duration) -> Self {
        Self {
            publishing_interval,
            ..Self::default()
        }
    }

    /// Sets the publishing interval.
    #[must_use]
    pub fn with_publishing_interval(mut self, interval: Duration) -> Self {
        self.publishing_interval = interval;
        self
    }

    /// Sets the lifetime count.
    #[must_use]
    pub fn with_lifetime_count(mut self, count: u32) -> Self {
        self.lifetime_count = count;
        self
    }

    /// Sets the maximum keep-alive count.
    #[must_use]
    pub fn with_max_keep_alive_count(mut self, count: u32) -> Self {
        self.max_keep_alive_count = count;
        self
    }

    /// Sets the maximum number of notifications per publish.
    #[must_use]
    pub fn with_max_notifications_per_publish(mut self, max: u32) -> Self {
        self.max_notifications_per_publish = max;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Sets whether publishing is enabled on creation.
    #[must_use]
    pub fn with_publishing_enabled(mut self, enabled: bool) -> Self {
        self.publishing_enabled = enabled;
        self
    }
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            publishing_interval: Self::DEFAULT_PUBLISHING_INTERVAL,
            lifetime_count: 10_000,
            max_keep_alive_count: 3_000,
            max_notifications_per_publish: 10_000,
            priority: 0,
            publishing_enabled: true,
        }
    }
}

/// Parameters as revised by the server.
///
/// The server may pick a different interval or counts than requested; these
/// are the values it actually uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisedSettings {
    /// Publishing interval in effect.
    #[serde(with = "duration_ms")]
    pub publishing_interval: Duration,
    /// Lifetime count in effect.
    pub lifetime_count: u32,
    /// Keep-alive count in effect.
    pub max_keep_alive_count: u32,
}

impl RevisedSettings {
    /// Echoes the requested settings back as revised values.
    #[must_use]
    pub fn from_requested(settings: &SubscriptionSettings) -> Self {
        Self {
            publishing_interval: settings.publishing_interval,
            lifetime_count: settings.lifetime_count,
            max_keep_alive_count: settings.max_keep_alive_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = SubscriptionSettings::default();
        assert_eq!(settings.publishing_interval, Duration::from_millis(500));
        assert!(settings.publishing_enabled);
        assert_eq!(settings.priority, 0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: SubscriptionSettings =
            serde_json::from_str(r#"{"publishing_interval": 100, "priority": 3}"#).unwrap();
        assert_eq!(settings.publishing_interval, Duration::from_millis(100));
        assert_eq!(settings.priority, 3);
        assert_eq!(settings.lifetime_count, 10_000);
    }

    #[test]
    fn revised_from_requested() {
        let settings = SubscriptionSettings::new(Duration::from_millis(250)).with_lifetime_count(60);
        let revised = RevisedSettings::from_requested(&settings);
        assert_eq!(revised.publishing_interval, Duration::from_millis(250));
        assert_eq!(revised.lifetime_count, 60);
    }
}
