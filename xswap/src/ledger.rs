//! The seam between the coordinator and a chain.
//!
//! One [`LedgerAdapter`] implementation exists per ledger family. The
//! coordinator never talks to a chain in any other way.

pub mod simulated;

use crate::{
    asset::Amount,
    identity::Identity,
    secret::Secret,
    secret_hash::{HashAlgorithm, SecretHash},
    timestamp::Timestamp,
};
use num::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The ledger family a leg lives on.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Chain {
    /// Contract based HTLCs (`initiateSwap`/`redeem`/`refund`).
    Ethereum,
    /// Protocol native HTLC objects (`htlc_create`/`htlc_redeem`), funds
    /// return to the sender automatically on expiry.
    BitShares,
}

impl Chain {
    /// The digest a swap initiated on this chain uses when configured as
    /// `chain-native`.
    pub fn native_hash_algorithm(self) -> HashAlgorithm {
        match self {
            Chain::Ethereum => HashAlgorithm::Sha256,
            Chain::BitShares => HashAlgorithm::Ripemd160,
        }
    }

    pub fn supports(self, algorithm: HashAlgorithm) -> bool {
        match (self, algorithm) {
            (Chain::Ethereum, HashAlgorithm::Sha256) => true,
            (Chain::Ethereum, HashAlgorithm::Ripemd160) => true,
            (Chain::Ethereum, HashAlgorithm::Hash160) => false,
            (Chain::BitShares, _) => true,
        }
    }

    /// Whether `amount` is representable by the chain's native integer
    /// type (uint256 on Ethereum, int64 share type on BitShares).
    pub fn fits_amount(self, amount: &Amount) -> bool {
        let bits = match self {
            Chain::Ethereum => 256,
            Chain::BitShares => 63,
        };

        amount.base_units() < &(BigUint::from(1u8) << bits)
    }
}

/// Chain specific handle to an HTLC, e.g. a contract id on Ethereum or an
/// object id (`1.16.x`) on BitShares.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LegRef {
    pub chain: Chain,
    pub id: String,
}

impl fmt::Display for LegRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-chain status of one leg. Only ever moves forward.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LegStatus {
    NotCreated,
    Pending,
    Funded,
    Redeemed,
    Refunded,
    Expired,
}

impl LegStatus {
    pub fn can_transition_to(self, next: LegStatus) -> bool {
        use LegStatus::*;

        matches!(
            (self, next),
            (NotCreated, Pending)
                | (NotCreated, Funded)
                | (Pending, Funded)
                | (Funded, Redeemed)
                | (Funded, Refunded)
                | (Funded, Expired)
                | (Expired, Refunded)
                // a redeem that landed before expiry, seen late
                | (Expired, Redeemed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LegStatus::Redeemed | LegStatus::Refunded)
    }
}

/// Everything needed to lock funds in an HTLC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HtlcParams {
    pub recipient: Identity,
    pub amount: Amount,
    pub secret_hash: SecretHash,
    pub timelock: Timestamp,
}

/// An HTLC as seen on chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservedHtlc {
    pub leg: LegRef,
    pub recipient: Identity,
    pub amount: Amount,
    pub secret_hash: SecretHash,
    pub timelock: Timestamp,
    pub status: LegStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Funded {
    pub leg: LegRef,
    pub transaction: TransactionId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redeemed {
    pub leg: LegRef,
    pub transaction: TransactionId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Refunded {
    pub leg: LegRef,
    pub transaction: TransactionId,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("transaction rejected: {0}")]
    Submission(String),
    #[error("insufficient funds to lock {0}")]
    InsufficientFunds(String),
    #[error("no confirmation within the configured timeout")]
    Timeout,
    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),
    #[error("HTLC has already been redeemed")]
    AlreadyRedeemed,
    #[error("HTLC timelock has expired")]
    Expired,
    #[error("HTLC has already been refunded")]
    AlreadyRefunded,
    #[error("HTLC timelock has not expired yet")]
    NotExpired,
    #[error("unknown HTLC {0}")]
    UnknownHtlc(LegRef),
}

impl Error {
    /// Only connectivity problems are worth retrying, everything else would
    /// fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ChainUnavailable(_))
    }
}

/// Uniform operations against one chain's HTLC primitive.
#[async_trait::async_trait]
pub trait LedgerAdapter: Send + Sync + 'static {
    fn chain(&self) -> Chain;

    /// Current ledger time, used for every expiry decision on this chain.
    async fn current_time(&self) -> Result<Timestamp, Error>;

    /// Submits the HTLC creation and returns as soon as it is broadcast.
    async fn create_htlc(&self, params: &HtlcParams) -> Result<LegRef, Error>;

    /// Resolves once the HTLC is funded with enough confirmations. Dropping
    /// the future cancels the wait.
    async fn wait_for_funded(&self, leg: &LegRef) -> Result<Funded, Error>;

    async fn redeem(&self, leg: &LegRef, secret: Secret) -> Result<Redeemed, Error>;

    /// On chains that refund automatically on expiry this succeeds without
    /// submitting anything once the timelock passed.
    async fn refund(&self, leg: &LegRef) -> Result<Refunded, Error>;

    /// Best-effort read of what the adapter currently knows, never waits for
    /// confirmations.
    async fn query_status(&self, leg: &LegRef) -> Result<LegStatus, Error>;

    /// Looks for an active HTLC paying `recipient`, e.g. the counterparty's
    /// mirrored HTLC. One locked to `secret_hash` is preferred, but an HTLC
    /// locked to another hash is still returned so it can be rejected.
    async fn find_htlc(
        &self,
        recipient: &Identity,
        secret_hash: &SecretHash,
    ) -> Result<Option<ObservedHtlc>, Error>;

    /// The preimage published by a redeem of `leg`, if it was redeemed.
    async fn revealed_secret(&self, leg: &LegRef) -> Result<Option<Secret>, Error>;
}

impl fmt::Debug for dyn LedgerAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerAdapter({})", self.chain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;

    #[test]
    fn leg_status_never_moves_backwards() {
        use LegStatus::*;

        assert!(Pending.can_transition_to(Funded));
        assert!(Expired.can_transition_to(Refunded));
        assert!(!Funded.can_transition_to(Pending));
        assert!(!Redeemed.can_transition_to(Refunded));
        assert!(!Refunded.can_transition_to(Redeemed));
        assert!(!Redeemed.can_transition_to(Expired));
        assert!(Expired.can_transition_to(Redeemed));
    }

    #[test]
    fn bitshares_amounts_are_bounded_by_int64() {
        let max = Amount::from_base_units(Asset::bts(), i64::MAX as u64);
        let too_much = Amount::from_base_units(Asset::bts(), 1u64 << 63);

        assert!(Chain::BitShares.fits_amount(&max));
        assert!(!Chain::BitShares.fits_amount(&too_much));
        assert!(Chain::Ethereum.fits_amount(&too_much));
    }

    #[test]
    fn only_chain_unavailable_is_transient() {
        assert!(Error::ChainUnavailable("connection refused".to_owned()).is_transient());
        assert!(!Error::Timeout.is_transient());
        assert!(!Error::Submission("nonce too low".to_owned()).is_transient());
    }

    #[test]
    fn chain_native_algorithm_is_supported_by_both_chains() {
        for chain in &[Chain::Ethereum, Chain::BitShares] {
            let algorithm = chain.native_hash_algorithm();

            assert!(Chain::Ethereum.supports(algorithm));
            assert!(Chain::BitShares.supports(algorithm));
        }
    }
}
