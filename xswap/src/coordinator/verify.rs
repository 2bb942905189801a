//! Checks an observed counterparty HTLC against what was agreed. The secret
//! is only ever revealed against an HTLC that passed these.

use crate::{
    error::Mismatch,
    ledger::ObservedHtlc,
    secret_hash::SecretHash,
    swap::LegTerms,
    timelock::TimelockPolicy,
    timestamp::Timestamp,
};

pub(crate) fn terms(
    observed: &ObservedHtlc,
    secret_hash: &SecretHash,
    expected: &LegTerms,
) -> Result<(), Mismatch> {
    if &observed.secret_hash != secret_hash {
        return Err(Mismatch::SecretHash {
            expected: secret_hash.clone(),
            actual: observed.secret_hash.clone(),
        });
    }
    if observed.amount != expected.amount {
        return Err(Mismatch::Amount {
            expected: expected.amount.clone(),
            actual: observed.amount.clone(),
        });
    }
    if observed.recipient != expected.recipient {
        return Err(Mismatch::Recipient {
            expected: expected.recipient.clone(),
            actual: observed.recipient.clone(),
        });
    }

    Ok(())
}

/// The participant HTLC has to expire early enough for the initiator to
/// refund safely after the secret became public.
pub(crate) fn timelock_gap(
    policy: &TimelockPolicy,
    initiator: Timestamp,
    participant: Timestamp,
) -> Result<(), Mismatch> {
    if policy.has_safe_gap(initiator, participant) {
        Ok(())
    } else {
        Err(Mismatch::TimelockGap {
            initiator,
            participant,
            required: policy.min_gap(),
        })
    }
}
