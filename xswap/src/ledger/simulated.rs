//! A ledger that only exists in memory.
//!
//! It follows the HTLC rules of the real chains closely enough to drive the
//! coordinator through every path: its clock only moves when told to,
//! confirmations can be held back, faults can be injected and, like
//! BitShares, it can hand expired HTLCs back to their sender by itself.

use crate::{
    asset::{Amount, Asset},
    identity::Identity,
    ledger::{
        Chain, Error, Funded, HtlcParams, LedgerAdapter, LegRef, LegStatus, ObservedHtlc,
        Redeemed, Refunded, TransactionId,
    },
    secret::Secret,
    secret_hash::SecretHash,
    timestamp::Timestamp,
};
use num::BigUint;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{watch, Mutex};

/// Adapter operations, used to inject faults and to count calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    CurrentTime,
    CreateHtlc,
    WaitForFunded,
    Redeem,
    Refund,
    QueryStatus,
    FindHtlc,
    RevealedSecret,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    /// HTLCs are funded as soon as they are created.
    Instant,
    /// HTLCs stay pending until [`SimulatedLedger::confirm`] is called.
    Manual,
}

#[derive(Debug)]
struct Htlc {
    leg: LegRef,
    params: HtlcParams,
    status: LegStatus,
    /// Created through this adapter, i.e. locked from the local wallet.
    own: bool,
    revealed: Option<Secret>,
}

impl Htlc {
    fn observed(&self) -> ObservedHtlc {
        ObservedHtlc {
            leg: self.leg.clone(),
            recipient: self.params.recipient.clone(),
            amount: self.params.amount.clone(),
            secret_hash: self.params.secret_hash.clone(),
            timelock: self.params.timelock,
            status: self.status,
        }
    }
}

#[derive(Debug)]
struct State {
    now: Timestamp,
    balance: BigUint,
    htlcs: Vec<Htlc>,
    faults: HashMap<Operation, VecDeque<Error>>,
    calls: HashMap<Operation, usize>,
    height: u64,
}

impl State {
    fn record(&mut self, operation: Operation) -> Result<(), Error> {
        *self.calls.entry(operation).or_default() += 1;

        match self.faults.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn htlc_mut(&mut self, leg: &LegRef) -> Result<&mut Htlc, Error> {
        self.htlcs
            .iter_mut()
            .find(|htlc| &htlc.leg == leg)
            .ok_or_else(|| Error::UnknownHtlc(leg.clone()))
    }
}

#[derive(Debug)]
pub struct SimulatedLedger {
    chain: Chain,
    asset: Asset,
    auto_refund: bool,
    confirmation: Confirmation,
    state: Mutex<State>,
    blocks: watch::Sender<u64>,
}

impl SimulatedLedger {
    /// A ledger whose local wallet holds `balance`. Auto refund on expiry
    /// defaults to the chain's behaviour.
    pub fn new(chain: Chain, now: Timestamp, balance: Amount) -> Self {
        let (blocks, _) = watch::channel(0);

        Self {
            chain,
            asset: balance.asset().clone(),
            auto_refund: chain == Chain::BitShares,
            confirmation: Confirmation::Instant,
            state: Mutex::new(State {
                now,
                balance: balance.base_units().clone(),
                htlcs: Vec::new(),
                faults: HashMap::new(),
                calls: HashMap::new(),
                height: 0,
            }),
            blocks,
        }
    }

    pub fn with_confirmation(self, confirmation: Confirmation) -> Self {
        Self {
            confirmation,
            ..self
        }
    }

    pub fn with_auto_refund(self, auto_refund: bool) -> Self {
        Self {
            auto_refund,
            ..self
        }
    }

    pub async fn now(&self) -> Timestamp {
        self.state.lock().await.now
    }

    pub async fn set_time(&self, now: Timestamp) {
        let mut state = self.state.lock().await;
        state.now = now;
        self.apply_expiries(&mut state);
        self.mine(&mut state);
    }

    pub async fn advance(&self, seconds: u32) {
        let now = self.now().await.plus(seconds);
        self.set_time(now).await;
    }

    /// Confirms a pending HTLC.
    pub async fn confirm(&self, leg: &LegRef) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        let htlc = state.htlc_mut(leg)?;
        if htlc.status == LegStatus::Pending {
            htlc.status = LegStatus::Funded;
        }
        self.mine(&mut state);

        Ok(())
    }

    /// Locks an HTLC on behalf of the counterparty, not paid from the local
    /// wallet. It is pending until confirmed like any other HTLC.
    pub async fn lock_counterparty_htlc(&self, params: HtlcParams) -> LegRef {
        let mut state = self.state.lock().await;
        let leg = self.next_leg_ref(&state);
        state.htlcs.push(Htlc {
            leg: leg.clone(),
            params,
            status: self.initial_status(),
            own: false,
            revealed: None,
        });
        self.mine(&mut state);

        leg
    }

    /// The next `times` calls of `operation` fail with `error`.
    pub async fn fail_next(&self, operation: Operation, times: usize, error: Error) {
        let mut state = self.state.lock().await;
        state
            .faults
            .entry(operation)
            .or_default()
            .extend(std::iter::repeat(error).take(times));
    }

    /// Drops the faults still queued for `operation`.
    pub async fn clear_faults(&self, operation: Operation) {
        self.state.lock().await.faults.remove(&operation);
    }

    /// Number of `wait_for_funded` calls currently in flight.
    pub fn pending_waits(&self) -> usize {
        self.blocks.receiver_count()
    }

    pub async fn calls(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(&operation)
            .copied()
            .unwrap_or_default()
    }

    pub async fn balance(&self) -> Amount {
        let state = self.state.lock().await;
        Amount::from_base_units(self.asset.clone(), state.balance.clone())
    }

    pub async fn htlc(&self, leg: &LegRef) -> Option<ObservedHtlc> {
        let state = self.state.lock().await;
        state
            .htlcs
            .iter()
            .find(|htlc| &htlc.leg == leg)
            .map(Htlc::observed)
    }

    fn initial_status(&self) -> LegStatus {
        match self.confirmation {
            Confirmation::Instant => LegStatus::Funded,
            Confirmation::Manual => LegStatus::Pending,
        }
    }

    fn next_leg_ref(&self, state: &State) -> LegRef {
        let n = state.htlcs.len() + 1;
        let id = match self.chain {
            Chain::Ethereum => format!("0x{:064x}", n),
            Chain::BitShares => format!("1.16.{}", n),
        };

        LegRef {
            chain: self.chain,
            id,
        }
    }

    fn apply_expiries(&self, state: &mut State) {
        let now = state.now;
        let mut returned = BigUint::from(0u8);

        for htlc in state
            .htlcs
            .iter_mut()
            .filter(|htlc| htlc.status == LegStatus::Funded && now >= htlc.params.timelock)
        {
            if self.auto_refund {
                htlc.status = LegStatus::Refunded;
                if htlc.own {
                    returned += htlc.params.amount.base_units();
                }
            } else {
                htlc.status = LegStatus::Expired;
            }
        }

        state.balance += returned;
    }

    fn mine(&self, state: &mut State) {
        state.height += 1;
        let height = state.height;
        self.blocks.send_replace(height);
    }

    fn transaction(&self, action: &str, leg: &LegRef) -> TransactionId {
        TransactionId(format!("{}-{}", action, leg.id))
    }
}

#[async_trait::async_trait]
impl LedgerAdapter for SimulatedLedger {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn current_time(&self) -> Result<Timestamp, Error> {
        let mut state = self.state.lock().await;
        state.record(Operation::CurrentTime)?;

        Ok(state.now)
    }

    async fn create_htlc(&self, params: &HtlcParams) -> Result<LegRef, Error> {
        let mut state = self.state.lock().await;
        state.record(Operation::CreateHtlc)?;

        if params.recipient.chain() != self.chain {
            return Err(Error::Submission(format!(
                "recipient {} is not a {} identity",
                params.recipient, self.chain
            )));
        }
        if params.amount.asset() != &self.asset {
            return Err(Error::Submission(format!(
                "cannot lock {} on a {} ledger",
                params.amount.asset().symbol,
                self.asset.symbol
            )));
        }
        if !self.chain.supports(params.secret_hash.algorithm()) {
            return Err(Error::Submission(format!(
                "{} does not support {}",
                self.chain,
                params.secret_hash.algorithm()
            )));
        }
        if params.timelock <= state.now {
            return Err(Error::Submission("timelock is in the past".to_owned()));
        }
        if &state.balance < params.amount.base_units() {
            return Err(Error::InsufficientFunds(params.amount.to_string()));
        }

        state.balance -= params.amount.base_units();

        let leg = self.next_leg_ref(&state);
        state.htlcs.push(Htlc {
            leg: leg.clone(),
            params: params.clone(),
            status: self.initial_status(),
            own: true,
            revealed: None,
        });
        self.mine(&mut state);

        Ok(leg)
    }

    async fn wait_for_funded(&self, leg: &LegRef) -> Result<Funded, Error> {
        self.state.lock().await.record(Operation::WaitForFunded)?;

        let mut blocks = self.blocks.subscribe();
        loop {
            {
                let mut state = self.state.lock().await;
                let htlc = state.htlc_mut(leg)?;
                if htlc.status != LegStatus::Pending {
                    return Ok(Funded {
                        leg: leg.clone(),
                        transaction: self.transaction("fund", leg),
                    });
                }
            }

            blocks
                .changed()
                .await
                .map_err(|_| Error::ChainUnavailable("ledger shut down".to_owned()))?;
        }
    }

    async fn redeem(&self, leg: &LegRef, secret: Secret) -> Result<Redeemed, Error> {
        let mut state = self.state.lock().await;
        state.record(Operation::Redeem)?;

        let now = state.now;
        let htlc = state.htlc_mut(leg)?;
        match htlc.status {
            LegStatus::Redeemed => return Err(Error::AlreadyRedeemed),
            LegStatus::Refunded => return Err(Error::AlreadyRefunded),
            LegStatus::Expired => return Err(Error::Expired),
            LegStatus::NotCreated | LegStatus::Pending => {
                return Err(Error::Submission("HTLC is not funded".to_owned()))
            }
            LegStatus::Funded => {}
        }
        if now >= htlc.params.timelock {
            return Err(Error::Expired);
        }
        if !htlc.params.secret_hash.matches(&secret) {
            return Err(Error::Submission("preimage does not match".to_owned()));
        }

        htlc.status = LegStatus::Redeemed;
        htlc.revealed = Some(secret);
        let received = if htlc.own {
            BigUint::from(0u8)
        } else {
            htlc.params.amount.base_units().clone()
        };
        state.balance += received;
        self.mine(&mut state);

        Ok(Redeemed {
            leg: leg.clone(),
            transaction: self.transaction("redeem", leg),
        })
    }

    async fn refund(&self, leg: &LegRef) -> Result<Refunded, Error> {
        let mut state = self.state.lock().await;
        state.record(Operation::Refund)?;

        let now = state.now;
        let auto_refund = self.auto_refund;
        let htlc = state.htlc_mut(leg)?;
        match htlc.status {
            LegStatus::Redeemed => return Err(Error::AlreadyRedeemed),
            LegStatus::Refunded if auto_refund => {
                return Ok(Refunded {
                    leg: leg.clone(),
                    transaction: self.transaction("expire", leg),
                })
            }
            LegStatus::Refunded => return Err(Error::AlreadyRefunded),
            LegStatus::NotCreated | LegStatus::Pending => {
                return Err(Error::Submission("HTLC is not funded".to_owned()))
            }
            LegStatus::Funded | LegStatus::Expired => {}
        }
        if now < htlc.params.timelock {
            return Err(Error::NotExpired);
        }

        htlc.status = LegStatus::Refunded;
        let returned = if htlc.own {
            htlc.params.amount.base_units().clone()
        } else {
            BigUint::from(0u8)
        };
        state.balance += returned;
        self.mine(&mut state);

        Ok(Refunded {
            leg: leg.clone(),
            transaction: self.transaction("refund", leg),
        })
    }

    async fn query_status(&self, leg: &LegRef) -> Result<LegStatus, Error> {
        let mut state = self.state.lock().await;
        state.record(Operation::QueryStatus)?;

        Ok(state.htlc_mut(leg)?.status)
    }

    async fn find_htlc(
        &self,
        recipient: &Identity,
        secret_hash: &SecretHash,
    ) -> Result<Option<ObservedHtlc>, Error> {
        let mut state = self.state.lock().await;
        state.record(Operation::FindHtlc)?;

        let active = state.htlcs.iter().filter(|htlc| {
            &htlc.params.recipient == recipient
                && matches!(htlc.status, LegStatus::Pending | LegStatus::Funded)
        });
        let (matching, other): (Vec<_>, Vec<_>) =
            active.partition(|htlc| &htlc.params.secret_hash == secret_hash);

        Ok(matching
            .first()
            .or_else(|| other.last())
            .map(|htlc| htlc.observed()))
    }

    async fn revealed_secret(&self, leg: &LegRef) -> Result<Option<Secret>, Error> {
        let mut state = self.state.lock().await;
        state.record(Operation::RevealedSecret)?;

        Ok(state.htlc_mut(leg)?.revealed)
    }
}
