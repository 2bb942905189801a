use crate::{
    config::{file, validation, File},
    ledger::Chain,
    secret_hash::HashAlgorithm,
    timelock::TimelockPolicy,
    timestamp::RelativeTime,
};
use anyhow::Result;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Effective configuration, every value present.
///
/// Built from a [`File`] by filling in defaults, see
/// [`Settings::from_config_file_and_defaults`].
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Settings {
    pub protocol: Protocol,
    pub ledger: Ledger,
    pub retry: Retry,
    pub logging: Logging,
}

/// Which digest commits to the secret of a new swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithmChoice {
    Sha256,
    Ripemd160,
    Hash160,
    /// The native digest of the chain the initiator funds on.
    ChainNative,
}

impl HashAlgorithmChoice {
    pub fn resolve(self, initiator_chain: Chain) -> HashAlgorithm {
        match self {
            HashAlgorithmChoice::Sha256 => HashAlgorithm::Sha256,
            HashAlgorithmChoice::Ripemd160 => HashAlgorithm::Ripemd160,
            HashAlgorithmChoice::Hash160 => HashAlgorithm::Hash160,
            HashAlgorithmChoice::ChainNative => initiator_chain.native_hash_algorithm(),
        }
    }
}

impl Default for HashAlgorithmChoice {
    fn default() -> Self {
        HashAlgorithmChoice::Sha256
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Protocol {
    pub hash_algorithm: HashAlgorithmChoice,
    pub min_timelock_window: RelativeTime,
    pub min_timelock_gap: RelativeTime,
}

impl Protocol {
    pub fn timelock_policy(&self) -> TimelockPolicy {
        TimelockPolicy::new(self.min_timelock_window, self.min_timelock_gap)
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithmChoice::default(),
            min_timelock_window: RelativeTime::from_hours(2),
            min_timelock_gap: RelativeTime::from_hours(1),
        }
    }
}

impl From<file::Protocol> for Protocol {
    fn from(protocol: file::Protocol) -> Self {
        let default = Protocol::default();

        Self {
            hash_algorithm: protocol.hash_algorithm.unwrap_or(default.hash_algorithm),
            min_timelock_window: protocol
                .min_timelock_window_secs
                .map_or(default.min_timelock_window, RelativeTime::new),
            min_timelock_gap: protocol
                .min_timelock_gap_secs
                .map_or(default.min_timelock_gap, RelativeTime::new),
        }
    }
}

impl From<Protocol> for file::Protocol {
    fn from(protocol: Protocol) -> Self {
        Self {
            hash_algorithm: Some(protocol.hash_algorithm),
            min_timelock_window_secs: Some(protocol.min_timelock_window.into()),
            min_timelock_gap_secs: Some(protocol.min_timelock_gap.into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ledger {
    /// Upper bound for one wait on a funding confirmation.
    pub confirmation_timeout: Duration,
    /// Cadence at which a swap re-checks ledger time and counterparty
    /// progress.
    pub poll_interval: Duration,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl From<file::Ledger> for Ledger {
    fn from(ledger: file::Ledger) -> Self {
        let default = Ledger::default();

        Self {
            confirmation_timeout: ledger
                .confirmation_timeout_secs
                .map_or(default.confirmation_timeout, Duration::from_secs),
            poll_interval: ledger
                .poll_interval_secs
                .map_or(default.poll_interval, Duration::from_secs),
        }
    }
}

impl From<Ledger> for file::Ledger {
    fn from(ledger: Ledger) -> Self {
        Self {
            confirmation_timeout_secs: Some(ledger.confirmation_timeout.as_secs()),
            poll_interval_secs: Some(ledger.poll_interval.as_secs()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Retry {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// First wait between attempts, grows exponentially.
    pub backoff: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

impl From<file::Retry> for Retry {
    fn from(retry: file::Retry) -> Self {
        let default = Retry::default();

        Self {
            max_attempts: retry.max_attempts.unwrap_or(default.max_attempts),
            backoff: retry
                .backoff_secs
                .map_or(default.backoff, Duration::from_secs),
        }
    }
}

impl From<Retry> for file::Retry {
    fn from(retry: Retry) -> Self {
        Self {
            max_attempts: Some(retry.max_attempts),
            backoff_secs: Some(retry.backoff.as_secs()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Logging {
    pub level: LevelFilter,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
        }
    }
}

impl From<Logging> for file::Logging {
    fn from(logging: Logging) -> Self {
        Self {
            level: Some(logging.level.into()),
        }
    }
}

impl From<Settings> for File {
    fn from(settings: Settings) -> Self {
        let Settings {
            protocol,
            ledger,
            retry,
            logging,
        } = settings;

        File {
            protocol: Some(protocol.into()),
            ledger: Some(ledger.into()),
            retry: Some(retry.into()),
            logging: Some(logging.into()),
        }
    }
}

impl Settings {
    pub fn from_config_file_and_defaults(config_file: File) -> Result<Self> {
        let File {
            protocol,
            ledger,
            retry,
            logging,
        } = config_file;

        let settings = Self {
            protocol: protocol.map(Protocol::from).unwrap_or_default(),
            ledger: ledger.map(Ledger::from).unwrap_or_default(),
            retry: retry.map(Retry::from).unwrap_or_default(),
            logging: {
                let level = logging
                    .and_then(|logging| logging.level)
                    .map_or(LevelFilter::Info, LevelFilter::from);
                Logging { level }
            },
        };

        validation::validate(&settings)?;

        Ok(settings)
    }
}
