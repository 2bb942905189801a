use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt, time::SystemTime};

/// A point in ledger time, in seconds since epoch.
///
/// Adapters normalize block heights or chain timestamps into this unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Timestamp(u32);

impl Timestamp {
    // This will work until 2106
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        Timestamp(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs() as u32)
                .unwrap_or_default(),
        )
    }

    pub fn plus(self, seconds: u32) -> Self {
        Self(self.0.saturating_add(seconds))
    }

    pub fn minus(self, seconds: u32) -> Self {
        Self(self.0.saturating_sub(seconds))
    }

    pub fn checked_add(self, rhs: RelativeTime) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Time left from `self` until `later`, zero if `later` already passed.
    pub fn until(self, later: Timestamp) -> RelativeTime {
        RelativeTime(later.0.saturating_sub(self.0))
    }
}

/// The u32 input is the number of seconds since epoch
impl From<u32> for Timestamp {
    fn from(item: u32) -> Self {
        Self(item)
    }
}

/// The u32 returned is the number of seconds since epoch
impl From<Timestamp> for u32 {
    fn from(item: Timestamp) -> Self {
        item.0
    }
}

impl From<Timestamp> for i64 {
    fn from(item: Timestamp) -> Self {
        i64::from(item.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A duration used to represent a relative timelock or a timelock window
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RelativeTime(u32);

impl RelativeTime {
    pub const fn new(time_secs: u32) -> Self {
        RelativeTime(time_secs)
    }

    pub const fn from_hours(hours: u32) -> Self {
        RelativeTime(hours * 60 * 60)
    }

    pub fn half(self) -> Self {
        RelativeTime(self.0 / 2)
    }

    pub fn saturating_sub(self, rhs: RelativeTime) -> Self {
        RelativeTime(self.0.saturating_sub(rhs.0))
    }

    pub fn saturating_mul(self, rhs: u32) -> Self {
        RelativeTime(self.0.saturating_mul(rhs))
    }

    pub fn to_std(self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.0))
    }
}

/// The u32 returned is the duration in seconds
impl From<RelativeTime> for u32 {
    fn from(item: RelativeTime) -> Self {
        item.0
    }
}

/// The u32 input is the duration in seconds
impl From<u32> for RelativeTime {
    fn from(item: u32) -> Self {
        Self(item)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
#[error("{0} seconds do not fit into a relative timelock")]
pub struct RelativeTimeOverflow(u64);

/// Precision is seconds only i.e., nanoseconds are ignored.
impl TryFrom<std::time::Duration> for RelativeTime {
    type Error = RelativeTimeOverflow;

    fn try_from(value: std::time::Duration) -> Result<Self, Self::Error> {
        let secs = value.as_secs();
        u32::try_from(secs)
            .map(RelativeTime)
            .map_err(|_| RelativeTimeOverflow(secs))
    }
}

impl fmt::Display for RelativeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn until_saturates_at_zero() {
        let t = Timestamp::from(1_000);

        assert_eq!(t.until(Timestamp::from(1_500)), RelativeTime::new(500));
        assert_eq!(t.until(Timestamp::from(900)), RelativeTime::new(0));
    }

    #[test]
    fn checked_add_detects_overflow() {
        let t = Timestamp::from(u32::MAX - 10);

        assert_eq!(t.checked_add(RelativeTime::new(10)), Some(Timestamp::from(u32::MAX)));
        assert_eq!(t.checked_add(RelativeTime::new(11)), None);
    }

    #[test]
    fn relative_time_from_std_duration_drops_nanos() {
        let duration = std::time::Duration::from_millis(7_200_999);

        assert_eq!(RelativeTime::try_from(duration), Ok(RelativeTime::new(7_200)));
        assert!(RelativeTime::try_from(std::time::Duration::from_secs(u64::MAX)).is_err());
    }
}
