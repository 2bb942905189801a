use crate::config::Settings;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum InvalidSettings {
    #[error("min_timelock_gap_secs must be greater than zero")]
    ZeroGap,
    #[error("min_timelock_window_secs ({window}) must be at least twice min_timelock_gap_secs ({gap})")]
    WindowTooSmallForGap { window: u32, gap: u32 },
    #[error("max_attempts must be at least 1")]
    NoAttempts,
    #[error("poll_interval_secs must be greater than zero")]
    ZeroPollInterval,
    #[error("confirmation_timeout_secs must be greater than zero")]
    ZeroConfirmationTimeout,
}

pub fn validate(settings: &Settings) -> Result<(), InvalidSettings> {
    let window = u32::from(settings.protocol.min_timelock_window);
    let gap = u32::from(settings.protocol.min_timelock_gap);

    if gap == 0 {
        return Err(InvalidSettings::ZeroGap);
    }
    if window / 2 < gap {
        return Err(InvalidSettings::WindowTooSmallForGap { window, gap });
    }
    if settings.retry.max_attempts == 0 {
        return Err(InvalidSettings::NoAttempts);
    }
    if settings.ledger.poll_interval.as_millis() == 0 {
        return Err(InvalidSettings::ZeroPollInterval);
    }
    if settings.ledger.confirmation_timeout.as_millis() == 0 {
        return Err(InvalidSettings::ZeroConfirmationTimeout);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::settings::Retry, RelativeTime};
    use spectral::prelude::*;

    #[test]
    fn defaults_are_valid() {
        assert_that(&validate(&Settings::default())).is_ok();
    }

    #[test]
    fn window_must_fit_two_gaps() {
        let mut settings = Settings::default();
        settings.protocol.min_timelock_window = RelativeTime::new(7_199);

        assert_that(&validate(&settings)).is_err_containing(
            InvalidSettings::WindowTooSmallForGap {
                window: 7_199,
                gap: 3_600,
            },
        );
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let settings = Settings {
            retry: Retry {
                max_attempts: 0,
                ..Retry::default()
            },
            ..Settings::default()
        };

        assert_that(&validate(&settings)).is_err_containing(InvalidSettings::NoAttempts);
    }
}
