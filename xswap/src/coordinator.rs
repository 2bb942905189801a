//! The swap state machine.
//!
//! [`Coordinator::start`] locks this party's leg and hands the swap to a
//! background driver which follows both chains: it waits for the funding
//! confirmations, verifies the counterparty HTLC and watches the timelocks.
//! Moving funds out of an HTLC is always an explicit call to
//! [`Coordinator::redeem`] or [`Coordinator::refund`].

mod driver;
mod handle;
mod verify;

use crate::{
    config::Settings,
    error::{Error, Mismatch, PartialRedeemWarning},
    feed::{Detail, StatusEvent},
    ledger::{self, Chain, HtlcParams, LedgerAdapter, LegStatus},
    retry,
    secret::Secret,
    secret_hash::{HashAlgorithm, SecretHash},
    secret_manager::SecretManager,
    swap::{Leg, LegTerms, Role, StartParams, Swap, SwapId, SwapState},
    timelock::{TimelockPolicy, Timelocks},
    timestamp::Timestamp,
};
use futures::Stream;
use handle::{Side, SwapHandle};
use std::{collections::HashMap, future::Future, sync::Arc};
use tokio::sync::Mutex;
use tracing_futures::Instrument;

/// Result of a [`Coordinator::redeem`] call that revealed the secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// Both legs are redeemed.
    Completed,
    /// The counterparty leg is redeemed, this party's leg is not. The swap
    /// stays in `Redeeming` and `redeem` can be called again.
    Partial(PartialRedeemWarning),
}

#[derive(Clone, Debug)]
pub struct Coordinator {
    inner: Arc<Context>,
}

/// State shared between the public API and the per swap drivers.
#[derive(Debug)]
pub(crate) struct Context {
    settings: Settings,
    policy: TimelockPolicy,
    secrets: SecretManager,
    adapters: HashMap<Chain, Arc<dyn LedgerAdapter>>,
    swaps: Mutex<HashMap<SwapId, Arc<SwapHandle>>>,
}

impl Coordinator {
    pub fn new<I>(settings: Settings, adapters: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn LedgerAdapter>>,
    {
        Self::with_secret_manager(settings, adapters, SecretManager::default())
    }

    pub fn with_secret_manager<I>(settings: Settings, adapters: I, secrets: SecretManager) -> Self
    where
        I: IntoIterator<Item = Arc<dyn LedgerAdapter>>,
    {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.chain(), adapter))
            .collect();

        Self {
            inner: Arc::new(Context {
                policy: settings.protocol.timelock_policy(),
                settings,
                secrets,
                adapters,
                swaps: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Commits to a secret hash, computes the timelocks and locks this
    /// party's leg.
    ///
    /// A participant first looks up the initiator's HTLC and refuses to lock
    /// anything unless it matches the agreed terms. Nothing is registered if
    /// this returns an error.
    pub async fn start(&self, params: StartParams) -> Result<SwapId, Error> {
        params.validate()?;
        let ctx = &self.inner;
        let own = ctx.adapter(params.own.chain)?;
        let counter = ctx.adapter(params.counterparty.chain)?;

        let now = ctx
            .retry("read the ledger time", || own.current_time())
            .await?;

        let id = SwapId::default();
        let swap = match params.role {
            Role::Initiator => ctx.prepare_initiator(id, &params, now)?,
            Role::Participant => ctx.prepare_participant(id, &params, now, &counter).await?,
        };

        let own_leg = swap.own_leg();
        let htlc = HtlcParams {
            recipient: own_leg.recipient.clone(),
            amount: own_leg.amount.clone(),
            secret_hash: swap.secret_hash.clone(),
            timelock: own_leg.timelock,
        };
        let leg = ctx
            .retry("create HTLC", || own.create_htlc(&htlc))
            .await?;
        tracing::info!(swap_id = %id, role = %params.role, htlc = %leg, timelock = %htlc.timelock, "locked own leg");

        let handle = Arc::new(SwapHandle::new(swap));
        ctx.swaps.lock().await.insert(id, handle.clone());

        handle
            .transition_with(
                SwapState::InitiatorFunding,
                Detail::HtlcCreated(leg.clone()),
                |swap| {
                    let own = swap.own_leg_mut();
                    own.contract_ref = Some(leg);
                    own.advance(LegStatus::Pending);
                },
            )
            .await?;

        tokio::spawn(
            driver::run(ctx.clone(), handle.clone())
                .instrument(tracing::info_span!("swap", id = %id)),
        );
        tokio::spawn(
            driver::watch_expiry(ctx.clone(), handle)
                .instrument(tracing::info_span!("expiry", id = %id)),
        );

        Ok(id)
    }

    /// Redeems the counterparty leg, publishing the secret, and then this
    /// party's leg.
    ///
    /// Concurrent calls for the same swap are serialized, the second one
    /// sees the outcome of the first.
    pub async fn redeem(&self, id: SwapId) -> Result<RedeemOutcome, Error> {
        let ctx = &self.inner;
        let handle = ctx.handle(id).await?;
        let _ops = handle.lock_operations().await;

        let swap = handle.snapshot().await;
        match swap.state {
            SwapState::CounterpartyFunded | SwapState::Redeeming => {}
            // the initiator may have redeemed our leg just before it expired
            SwapState::TimedOut if swap.role == Role::Participant => {}
            SwapState::Completed => return Err(ledger::Error::AlreadyRedeemed.into()),
            state => {
                return Err(Error::InvalidState {
                    action: "redeem",
                    state,
                })
            }
        }

        let secret = match swap.secret() {
            Some(secret) => secret,
            None => ctx.revealed_secret(&swap).await?,
        };
        if !ctx.secrets.verify(&secret, &swap.secret_hash) {
            return Err(Error::SecretMismatch);
        }

        let counter = swap.counter_leg();
        if counter.status != LegStatus::Redeemed {
            let leg = counter.contract()?.clone();
            let adapter = ctx.adapter(counter.chain)?;

            if ctx.is_expired(&adapter, counter.timelock).await? {
                return Err(expired(&handle).await);
            }
            if swap.state != SwapState::Redeeming {
                handle
                    .transition(SwapState::Redeeming, Detail::RedeemStarted)
                    .await?;
            }

            match ctx
                .retry("redeem counterparty HTLC", || adapter.redeem(&leg, secret))
                .await
            {
                Ok(_) | Err(ledger::Error::AlreadyRedeemed) => {}
                Err(ledger::Error::Expired) => return Err(expired(&handle).await),
                Err(e) => return Err(e.into()),
            }

            let detail = if swap.secret_revealed {
                Detail::Redeemed(leg)
            } else {
                Detail::SecretRevealed(leg)
            };
            handle
                .publish_with(detail, |swap| {
                    swap.counter_leg_mut().advance(LegStatus::Redeemed);
                    swap.learn_secret(secret);
                })
                .await;
        } else if swap.state != SwapState::Redeeming {
            handle
                .transition(SwapState::Redeeming, Detail::RedeemStarted)
                .await?;
        }

        let own = swap.own_leg();
        let leg = own.contract()?.clone();
        if own.status != LegStatus::Redeemed {
            let adapter = ctx.adapter(own.chain)?;
            match ctx
                .retry("redeem own HTLC", || adapter.redeem(&leg, secret))
                .await
            {
                Ok(_) | Err(ledger::Error::AlreadyRedeemed) => {}
                Err(reason) => {
                    let warning = PartialRedeemWarning {
                        swap_id: id,
                        chain: own.chain,
                        reason,
                    };
                    tracing::warn!("{}", warning);
                    handle
                        .publish_with(Detail::PartialRedeem(warning.clone()), |_| {})
                        .await;

                    return Ok(RedeemOutcome::Partial(warning));
                }
            }
        }

        handle
            .transition_with(SwapState::Completed, Detail::Redeemed(leg), |swap| {
                swap.own_leg_mut().advance(LegStatus::Redeemed);
            })
            .await?;

        Ok(RedeemOutcome::Completed)
    }

    /// Takes this party's funds back after its timelock passed.
    ///
    /// Only accepted once the swap timed out. Chains that return expired
    /// HTLCs by themselves report success without a new transaction.
    pub async fn refund(&self, id: SwapId) -> Result<(), Error> {
        let ctx = &self.inner;
        let handle = ctx.handle(id).await?;
        let _ops = handle.lock_operations().await;

        let swap = handle.snapshot().await;
        match swap.state {
            SwapState::TimedOut | SwapState::Refunding => {}
            SwapState::Refunded => return Err(ledger::Error::AlreadyRefunded.into()),
            SwapState::Completed => return Err(ledger::Error::AlreadyRedeemed.into()),
            SwapState::Failed => {
                return Err(Error::InvalidState {
                    action: "refund",
                    state: SwapState::Failed,
                })
            }
            _ => return Err(ledger::Error::NotExpired.into()),
        }

        let own = swap.own_leg();
        if own.status == LegStatus::Redeemed {
            return Err(ledger::Error::AlreadyRedeemed.into());
        }
        let leg = own.contract()?.clone();
        let adapter = ctx.adapter(own.chain)?;

        if !ctx.is_expired(&adapter, own.timelock).await? {
            return Err(ledger::Error::NotExpired.into());
        }
        if swap.state == SwapState::TimedOut {
            handle
                .transition(SwapState::Refunding, Detail::RefundStarted)
                .await?;
        }

        match ctx.retry("refund HTLC", || adapter.refund(&leg)).await {
            Ok(_) | Err(ledger::Error::AlreadyRefunded) => {}
            Err(e) => return Err(e.into()),
        }

        handle
            .transition_with(SwapState::Refunded, Detail::Refunded(leg), |swap| {
                swap.own_leg_mut().advance(LegStatus::Refunded);
            })
            .await
    }

    pub async fn get_state(&self, id: SwapId) -> Result<SwapState, Error> {
        Ok(self.inner.handle(id).await?.state().await)
    }

    /// The swap record. The secret is left out until it is public.
    pub async fn swap(&self, id: SwapId) -> Result<Swap, Error> {
        Ok(self.inner.handle(id).await?.snapshot().await.redacted())
    }

    /// Events of the swap, starting with a snapshot of its current state.
    pub async fn subscribe(
        &self,
        id: SwapId,
    ) -> Result<impl Stream<Item = StatusEvent> + Send + 'static, Error> {
        Ok(self.inner.handle(id).await?.subscribe().await)
    }

    pub async fn swap_ids(&self) -> Vec<SwapId> {
        self.inner.swaps.lock().await.keys().copied().collect()
    }

    /// Drops a finished swap from the registry and returns its final record.
    pub async fn forget(&self, id: SwapId) -> Result<Swap, Error> {
        let mut swaps = self.inner.swaps.lock().await;
        let handle = swaps.get(&id).ok_or(Error::NotFound(id))?;

        let swap = handle.snapshot().await;
        if !swap.state.is_terminal() {
            return Err(Error::InvalidState {
                action: "forget",
                state: swap.state,
            });
        }
        swaps.remove(&id);

        Ok(swap.redacted())
    }
}

impl Context {
    fn adapter(&self, chain: Chain) -> Result<Arc<dyn LedgerAdapter>, Error> {
        self.adapters
            .get(&chain)
            .cloned()
            .ok_or(Error::NoAdapter(chain))
    }

    async fn handle(&self, id: SwapId) -> Result<Arc<SwapHandle>, Error> {
        self.swaps
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    async fn retry<T, F, Fut>(&self, what: &str, operation: F) -> Result<T, ledger::Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ledger::Error>>,
    {
        retry::with_backoff(&self.settings.retry, what, operation).await
    }

    async fn is_expired(
        &self,
        adapter: &Arc<dyn LedgerAdapter>,
        timelock: Timestamp,
    ) -> Result<bool, Error> {
        let now = self
            .retry("read the ledger time", || adapter.current_time())
            .await?;

        Ok(self.policy.is_expired(timelock, now))
    }

    /// A participant learns the secret from the initiator's redeem of the
    /// participant leg.
    async fn revealed_secret(&self, swap: &Swap) -> Result<Secret, Error> {
        let own = swap.own_leg();
        let leg = own.contract()?;
        let adapter = self.adapter(own.chain)?;

        self.retry("look up the revealed secret", || {
            adapter.revealed_secret(leg)
        })
        .await?
        .ok_or(Error::SecretNotRevealed)
    }

    fn check_algorithm(&self, params: &StartParams, algorithm: HashAlgorithm) -> Result<(), Error> {
        match [params.own.chain, params.counterparty.chain]
            .iter()
            .find(|chain| !chain.supports(algorithm))
        {
            Some(chain) => Err(Error::InvalidParams(format!(
                "{} does not support {} secret hashes",
                chain, algorithm
            ))),
            None => Ok(()),
        }
    }

    fn prepare_initiator(
        &self,
        id: SwapId,
        params: &StartParams,
        now: Timestamp,
    ) -> Result<Swap, Error> {
        let algorithm = self
            .settings
            .protocol
            .hash_algorithm
            .resolve(params.initiator_chain());
        self.check_algorithm(params, algorithm)?;

        let Timelocks {
            initiator,
            participant,
        } = self.policy.compute_timelocks(now, params.desired_window)?;
        let (secret, secret_hash) = self.secrets.generate(algorithm)?;

        Ok(Swap::new(
            id,
            Role::Initiator,
            Some(secret),
            secret_hash,
            expected_leg(&params.own, initiator),
            expected_leg(&params.counterparty, participant),
            now,
        ))
    }

    async fn prepare_participant(
        &self,
        id: SwapId,
        params: &StartParams,
        now: Timestamp,
        counter: &Arc<dyn LedgerAdapter>,
    ) -> Result<Swap, Error> {
        let secret_hash: SecretHash = params
            .secret_hash
            .clone()
            .ok_or_else(|| Error::InvalidParams("missing secret hash".to_owned()))?;
        self.check_algorithm(params, secret_hash.algorithm())?;

        let observed = self
            .retry("look up the initiator HTLC", || {
                counter.find_htlc(&params.counterparty.recipient, &secret_hash)
            })
            .await?
            .ok_or_else(|| Error::CounterpartyNotFound(secret_hash.clone()))?;
        verify::terms(&observed, &secret_hash, &params.counterparty)?;
        if observed.status != LegStatus::Funded {
            return Err(Mismatch::NotFunded(observed.status).into());
        }

        let Timelocks {
            initiator,
            participant,
        } = self.policy.mirror(observed.timelock, params.desired_window)?;
        if self.policy.is_expired(participant, now) {
            return Err(Mismatch::TooLate { participant, now }.into());
        }

        let mut initiator_leg = expected_leg(&params.counterparty, initiator);
        initiator_leg.contract_ref = Some(observed.leg);
        initiator_leg.status = LegStatus::Funded;

        Ok(Swap::new(
            id,
            Role::Participant,
            None,
            secret_hash,
            initiator_leg,
            expected_leg(&params.own, participant),
            now,
        ))
    }
}

/// The counterparty leg expired before it could be redeemed.
async fn expired(handle: &SwapHandle) -> Error {
    if handle.state().await != SwapState::TimedOut {
        if let Err(e) = handle.time_out(Side::Counter).await {
            return e;
        }
    }

    ledger::Error::Expired.into()
}

fn expected_leg(terms: &LegTerms, timelock: Timestamp) -> Leg {
    Leg {
        chain: terms.chain,
        contract_ref: None,
        amount: terms.amount.clone(),
        recipient: terms.recipient.clone(),
        timelock,
        status: LegStatus::NotCreated,
    }
}
