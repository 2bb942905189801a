use crate::{
    asset::Amount,
    identity::Identity,
    ledger::{self, Chain},
    secret_hash::SecretHash,
    secret_manager::EntropyError,
    swap::{SwapId, SwapState},
    timelock::InvalidWindow,
    timestamp::{RelativeTime, Timestamp},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Entropy(#[from] EntropyError),
    #[error(transparent)]
    InvalidWindow(#[from] InvalidWindow),
    #[error(transparent)]
    Ledger(#[from] ledger::Error),
    #[error("counterparty HTLC does not match the agreed terms: {0}")]
    CounterpartyMismatch(#[from] Mismatch),
    #[error("no HTLC locked to {0} found on the counterparty chain")]
    CounterpartyNotFound(SecretHash),
    #[error("invalid swap parameters: {0}")]
    InvalidParams(String),
    #[error("no ledger adapter registered for {0}")]
    NoAdapter(Chain),
    #[error("swap {0} not found")]
    NotFound(SwapId),
    #[error("cannot {action} swap in state {state}")]
    InvalidState {
        action: &'static str,
        state: SwapState,
    },
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: SwapState, to: SwapState },
    #[error("secret does not match the committed hash")]
    SecretMismatch,
    #[error("secret has not been revealed on chain yet")]
    SecretNotRevealed,
}

impl Error {
    pub fn is_already_refunded(&self) -> bool {
        matches!(self, Error::Ledger(ledger::Error::AlreadyRefunded))
    }

    pub fn is_already_redeemed(&self) -> bool {
        matches!(self, Error::Ledger(ledger::Error::AlreadyRedeemed))
    }
}

/// Why an observed counterparty HTLC was rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Mismatch {
    #[error("locked to {actual} instead of {expected}")]
    SecretHash {
        expected: SecretHash,
        actual: SecretHash,
    },
    #[error("locks {actual} instead of {expected}")]
    Amount { expected: Amount, actual: Amount },
    #[error("pays {actual} instead of {expected}")]
    Recipient {
        expected: Identity,
        actual: Identity,
    },
    #[error("timelocks {initiator} and {participant} are less than {required} apart")]
    TimelockGap {
        initiator: Timestamp,
        participant: Timestamp,
        required: RelativeTime,
    },
    #[error("HTLC is {0} instead of funded")]
    NotFunded(ledger::LegStatus),
    #[error("participant timelock {participant} has already passed at {now}")]
    TooLate {
        participant: Timestamp,
        now: Timestamp,
    },
}

/// The secret is public but one leg is still unredeemed.
///
/// The swap stays actionable: `redeem` can be retried until that leg's
/// timelock passes, after which it can only be refunded.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("swap {swap_id}: secret revealed but redeeming the {chain} leg failed: {reason}")]
pub struct PartialRedeemWarning {
    pub swap_id: SwapId,
    pub chain: Chain,
    pub reason: ledger::Error,
}
