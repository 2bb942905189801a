//! Timelock policy for the two legs of a swap.
//!
//! The participant leg must expire before the initiator leg. Whoever redeems
//! the participant leg reveals the secret, the other party then needs time to
//! claim the initiator leg with it before that one expires. The gap between
//! the two timelocks is that time.

use crate::timestamp::{RelativeTime, Timestamp};

/// Absolute timelocks of both legs of a swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timelocks {
    pub initiator: Timestamp,
    pub participant: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidWindow {
    #[error("timelock window of {desired} is shorter than the minimum of {minimum}")]
    TooShort {
        desired: RelativeTime,
        minimum: RelativeTime,
    },
    #[error("timelock window of {desired} leaves a gap of {gap}, at least {minimum} is required")]
    InsufficientGap {
        desired: RelativeTime,
        gap: RelativeTime,
        minimum: RelativeTime,
    },
    #[error("timelock window of {desired} starting at {now} overflows")]
    Overflow {
        now: Timestamp,
        desired: RelativeTime,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimelockPolicy {
    min_window: RelativeTime,
    min_gap: RelativeTime,
}

impl TimelockPolicy {
    pub fn new(min_window: RelativeTime, min_gap: RelativeTime) -> Self {
        Self {
            min_window,
            min_gap,
        }
    }

    pub fn min_gap(&self) -> RelativeTime {
        self.min_gap
    }

    /// The participant leg expires after half the window, the initiator leg
    /// after the full window.
    pub fn compute_timelocks(
        &self,
        now: Timestamp,
        desired_window: RelativeTime,
    ) -> Result<Timelocks, InvalidWindow> {
        let gap = self.check_window(desired_window)?;

        let overflow = InvalidWindow::Overflow {
            now,
            desired: desired_window,
        };
        let initiator = now.checked_add(desired_window).ok_or(overflow)?;
        let participant = now.checked_add(desired_window.half()).ok_or(overflow)?;
        debug_assert_eq!(participant.until(initiator), gap);

        Ok(Timelocks {
            initiator,
            participant,
        })
    }

    /// Timelocks for a participant mirroring an initiator HTLC that expires
    /// at `initiator`. Both parties end up with the same pair as long as they
    /// agreed on the window.
    pub fn mirror(
        &self,
        initiator: Timestamp,
        desired_window: RelativeTime,
    ) -> Result<Timelocks, InvalidWindow> {
        let gap = self.check_window(desired_window)?;

        Ok(Timelocks {
            initiator,
            participant: initiator.minus(gap.into()),
        })
    }

    /// Returns the gap between the two timelocks `desired_window` yields.
    fn check_window(&self, desired_window: RelativeTime) -> Result<RelativeTime, InvalidWindow> {
        if desired_window < self.min_window {
            return Err(InvalidWindow::TooShort {
                desired: desired_window,
                minimum: self.min_window,
            });
        }

        let gap = desired_window.saturating_sub(desired_window.half());
        if gap < self.min_gap {
            return Err(InvalidWindow::InsufficientGap {
                desired: desired_window,
                gap,
                minimum: self.min_gap,
            });
        }

        Ok(gap)
    }

    /// An HTLC can no longer be redeemed once ledger time reaches its
    /// timelock.
    pub fn is_expired(&self, timelock: Timestamp, now: Timestamp) -> bool {
        now >= timelock
    }

    /// True if the participant leg expires at least `min_gap` before the
    /// initiator leg.
    pub fn has_safe_gap(&self, initiator: Timestamp, participant: Timestamp) -> bool {
        participant < initiator && participant.until(initiator) >= self.min_gap
    }

    /// If no action is taken within the returned time the leg with
    /// `timelock` expires.
    pub fn should_act_within(&self, timelock: Timestamp, now: Timestamp) -> RelativeTime {
        now.until(timelock)
    }
}
