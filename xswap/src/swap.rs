//! The data model of a swap.

use crate::{
    asset::Amount,
    error::Error,
    identity::Identity,
    ledger::{Chain, LegRef, LegStatus},
    secret::Secret,
    secret_hash::SecretHash,
    timestamp::{RelativeTime, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[serde(transparent)]
pub struct SwapId(Uuid);

impl Default for SwapId {
    fn default() -> Self {
        SwapId(Uuid::new_v4())
    }
}

impl FromStr for SwapId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s).map(SwapId)
    }
}

impl From<Uuid> for SwapId {
    fn from(uuid: Uuid) -> Self {
        SwapId(uuid)
    }
}

impl fmt::Display for SwapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The initiator generates the secret and funds the leg with the longer
/// timelock, the participant mirrors it.
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
pub enum Role {
    Initiator,
    Participant,
}

/// Lifecycle of a swap, seen from the party running the coordinator.
///
/// `InitiatorFunding`/`InitiatorFunded` refer to the leg this party funds,
/// `Counterparty*` to the leg the other party funds.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SwapState {
    Created,
    InitiatorFunding,
    InitiatorFunded,
    WaitingCounterparty,
    CounterpartyFunded,
    Redeeming,
    Completed,
    TimedOut,
    Refunding,
    Refunded,
    Failed,
}

impl SwapState {
    pub fn can_transition_to(self, next: SwapState) -> bool {
        use SwapState::*;

        matches!(
            (self, next),
            (Created, InitiatorFunding)
                | (Created, Failed)
                | (InitiatorFunding, InitiatorFunded)
                | (InitiatorFunding, Failed)
                | (InitiatorFunded, WaitingCounterparty)
                | (InitiatorFunded, TimedOut)
                | (InitiatorFunded, Failed)
                | (WaitingCounterparty, CounterpartyFunded)
                | (WaitingCounterparty, TimedOut)
                | (WaitingCounterparty, Failed)
                | (CounterpartyFunded, Redeeming)
                | (CounterpartyFunded, TimedOut)
                | (CounterpartyFunded, Failed)
                | (Redeeming, Completed)
                | (Redeeming, TimedOut)
                | (TimedOut, Refunding)
                | (TimedOut, Failed)
                // own leg redeemed late, the counterparty leg is still open
                | (TimedOut, Redeeming)
                | (Refunding, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SwapState::Completed | SwapState::Refunded | SwapState::Failed
        )
    }
}

/// One HTLC of a swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub chain: Chain,
    pub contract_ref: Option<LegRef>,
    pub amount: Amount,
    pub recipient: Identity,
    pub timelock: Timestamp,
    pub status: LegStatus,
}

impl Leg {
    /// Moves the status forward, anything else is ignored. Returns whether
    /// the status changed.
    pub(crate) fn advance(&mut self, next: LegStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            if self.status != next {
                tracing::warn!(chain = %self.chain, from = %self.status, to = %next, "ignoring backwards leg status");
            }
            false
        }
    }

    pub(crate) fn contract(&self) -> Result<&LegRef, Error> {
        self.contract_ref.as_ref().ok_or_else(|| {
            Error::InvalidParams(format!("{} leg has no HTLC on chain yet", self.chain))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Swap {
    pub id: SwapId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret: Option<Secret>,
    pub secret_hash: SecretHash,
    pub initiator_leg: Leg,
    pub participant_leg: Leg,
    pub role: Role,
    pub state: SwapState,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub secret_revealed: bool,
}

impl Swap {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: SwapId,
        role: Role,
        secret: Option<Secret>,
        secret_hash: SecretHash,
        initiator_leg: Leg,
        participant_leg: Leg,
        created_at: Timestamp,
    ) -> Self {
        let expires_at = initiator_leg.timelock.max(participant_leg.timelock);

        Self {
            id,
            secret,
            secret_hash,
            initiator_leg,
            participant_leg,
            role,
            state: SwapState::Created,
            created_at,
            expires_at,
            secret_revealed: false,
        }
    }

    pub fn secret(&self) -> Option<Secret> {
        self.secret
    }

    pub(crate) fn learn_secret(&mut self, secret: Secret) {
        self.secret = Some(secret);
        self.secret_revealed = true;
    }

    /// The leg this party funds.
    pub fn own_leg(&self) -> &Leg {
        match self.role {
            Role::Initiator => &self.initiator_leg,
            Role::Participant => &self.participant_leg,
        }
    }

    pub fn counter_leg(&self) -> &Leg {
        match self.role {
            Role::Initiator => &self.participant_leg,
            Role::Participant => &self.initiator_leg,
        }
    }

    pub(crate) fn own_leg_mut(&mut self) -> &mut Leg {
        match self.role {
            Role::Initiator => &mut self.initiator_leg,
            Role::Participant => &mut self.participant_leg,
        }
    }

    pub(crate) fn counter_leg_mut(&mut self) -> &mut Leg {
        match self.role {
            Role::Initiator => &mut self.participant_leg,
            Role::Participant => &mut self.initiator_leg,
        }
    }

    /// Copy of the swap that is safe to hand out: the secret is only
    /// included once it is public.
    pub fn redacted(&self) -> Self {
        let mut swap = self.clone();
        if !swap.secret_revealed {
            swap.secret = None;
        }
        swap
    }
}

/// Terms of one leg as agreed with the counterparty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegTerms {
    pub chain: Chain,
    /// Who can redeem this leg.
    pub recipient: Identity,
    pub amount: Amount,
}

impl LegTerms {
    fn validate(&self, which: &str) -> Result<(), Error> {
        if self.recipient.chain() != self.chain {
            return Err(Error::InvalidParams(format!(
                "{} leg on {} pays to a {} identity",
                which,
                self.chain,
                self.recipient.chain()
            )));
        }
        if self.amount.is_zero() {
            return Err(Error::InvalidParams(format!("{} leg amount is zero", which)));
        }
        if !self.chain.fits_amount(&self.amount) {
            return Err(Error::InvalidParams(format!(
                "{} leg amount {} does not fit {}",
                which, self.amount, self.chain
            )));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartParams {
    pub role: Role,
    /// The leg this party funds, paying the counterparty.
    pub own: LegTerms,
    /// The leg the counterparty funds, paying this party.
    pub counterparty: LegTerms,
    pub desired_window: RelativeTime,
    /// Required for [`Role::Participant`], the initiator's commitment.
    pub secret_hash: Option<SecretHash>,
}

impl StartParams {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.own.chain == self.counterparty.chain {
            return Err(Error::InvalidParams(format!(
                "both legs are on {}",
                self.own.chain
            )));
        }
        self.own.validate("own")?;
        self.counterparty.validate("counterparty")?;

        match (self.role, &self.secret_hash) {
            (Role::Initiator, Some(_)) => Err(Error::InvalidParams(
                "the initiator generates the secret hash".to_owned(),
            )),
            (Role::Participant, None) => Err(Error::InvalidParams(
                "a participant needs the initiator's secret hash".to_owned(),
            )),
            _ => Ok(()),
        }
    }

    /// Chain the initiator funds on.
    pub(crate) fn initiator_chain(&self) -> Chain {
        match self.role {
            Role::Initiator => self.own.chain,
            Role::Participant => self.counterparty.chain,
        }
    }
}
