// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-subscription sequence number tracking.

/// Outcome of admitting a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// First batch seen for the subscription.
    First,
    /// Exactly one past the last delivered batch.
    InOrder,
    /// Newer than expected; `missing` batches were skipped.
    Gap {
        /// Number of sequence numbers between the last delivered one and this one.
        missing: u32,
    },
    /// Equal to or older than the last delivered batch.
    Stale,
}

impl SequenceCheck {
    /// Returns `true` if the batch should be delivered.
    #[must_use]
    pub const fn is_deliverable(&self) -> bool {
        !matches!(self, Self::Stale)
    }
}

/// Remembers the last delivered sequence number of one subscription.
///
/// Comparisons use serial number arithmetic, so tracking survives the wrap
/// from `u32::MAX` back to `1` (`0` is never used by servers).
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: Option<u32>,
}

impl SequenceTracker {
    /// Creates a tracker that has seen nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Checks `sequence` and records it if it is deliverable.
    pub fn admit(&mut self, sequence: u32) -> SequenceCheck {
        let Some(last) = self.last else {
            self.last = Some(sequence);
            return SequenceCheck::First;
        };

        let expected = next_sequence(last);
        #[allow(clippy::cast_possible_wrap)]
        let distance = sequence.wrapping_sub(last) as i32;

        if distance <= 0 {
            return SequenceCheck::Stale;
        }

        self.last = Some(sequence);
        if sequence == expected {
            SequenceCheck::InOrder
        } else {
            let mut missing = sequence.wrapping_sub(expected);
            // `0` lies between them but is never sent.
            if sequence < expected {
                missing -= 1;
            }
            SequenceCheck::Gap { missing }
        }
    }

    /// Returns the last delivered sequence number.
    #[must_use]
    pub const fn last(&self) -> Option<u32> {
        self.last
    }
}

/// Sequence number following `seq`, skipping `0`.
fn next_sequence(seq: u32) -> u32 {
    match seq.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_sequence() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.admit(1), SequenceCheck::First);
        assert_eq!(tracker.admit(2), SequenceCheck::InOrder);
        assert_eq!(tracker.admit(3), SequenceCheck::InOrder);
        assert_eq!(tracker.last(), Some(3));
    }

    #[test]
    fn older_and_duplicate_batches_are_stale() {
        let mut tracker = SequenceTracker::new();
        tracker.admit(5);
        assert_eq!(tracker.admit(3), SequenceCheck::Stale);
        assert_eq!(tracker.admit(5), SequenceCheck::Stale);
        assert_eq!(tracker.last(), Some(5));
    }

    #[test]
    fn gap_is_reported_and_accepted() {
        let mut tracker = SequenceTracker::new();
        tracker.admit(1);
        assert_eq!(tracker.admit(4), SequenceCheck::Gap { missing: 2 });
        assert_eq!(tracker.admit(5), SequenceCheck::InOrder);
    }

    #[test]
    fn wraps_past_max() {
        let mut tracker = SequenceTracker::new();
        tracker.admit(u32::MAX);
        assert_eq!(tracker.admit(1), SequenceCheck::InOrder);
        assert_eq!(tracker.admit(u32::MAX), SequenceCheck::Stale);
    }

    #[test]
    fn gap_across_wrap_skips_zero() {
        let mut tracker = SequenceTracker::new();
        tracker.admit(u32::MAX - 1);
        assert_eq!(tracker.admit(1), SequenceCheck::Gap { missing: 1 });

        let mut tracker = SequenceTracker::new();
        tracker.admit(u32::MAX - 2);
        assert_eq!(tracker.admit(3), SequenceCheck::Gap { missing: 4 });
    }
}
