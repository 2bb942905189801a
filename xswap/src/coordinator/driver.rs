//! Background tasks following a swap on both chains.
//!
//! [`run`] moves the swap forward whenever the chains allow it and
//! [`watch_expiry`] moves it to `TimedOut` once a leg that still matters
//! expires. Neither ever moves funds.

use super::{verify, Context, Side, SwapHandle};
use crate::{
    error::{Error, Mismatch},
    feed::Detail,
    ledger::{self, LegRef, LegStatus},
    swap::{LegTerms, Role, Swap, SwapState},
};
use std::sync::Arc;

pub(crate) async fn run(ctx: Arc<Context>, handle: Arc<SwapHandle>) {
    loop {
        let state = handle.state().await;
        if state.is_terminal() {
            tracing::debug!(%state, "swap finished");
            return;
        }

        if let Err(e) = step(&ctx, &handle, state).await {
            tracing::warn!("failed to make progress in state {}: {:#}", state, e);
        }

        if handle.state().await == state {
            tokio::time::sleep(ctx.settings.ledger.poll_interval).await;
        }
    }
}

async fn step(ctx: &Context, handle: &SwapHandle, state: SwapState) -> Result<(), Error> {
    match state {
        SwapState::InitiatorFunding => await_own_funding(ctx, handle).await,
        SwapState::InitiatorFunded => {
            let chain = handle.snapshot().await.counter_leg().chain;
            advance(
                handle,
                state,
                SwapState::WaitingCounterparty,
                Detail::AwaitingCounterparty(chain),
                |_| {},
            )
            .await
        }
        SwapState::WaitingCounterparty => match handle.snapshot().await.role {
            Role::Initiator => await_counterparty(ctx, handle).await,
            Role::Participant => confirm_counterparty(ctx, handle).await,
        },
        SwapState::CounterpartyFunded | SwapState::Redeeming => learn_secret(ctx, handle).await,
        SwapState::TimedOut | SwapState::Refunding => observe_refund(ctx, handle).await,
        SwapState::Created
        | SwapState::Completed
        | SwapState::Refunded
        | SwapState::Failed => Ok(()),
    }
}

/// Applies a transition unless the swap left `from` in the meantime.
async fn advance<F>(
    handle: &SwapHandle,
    from: SwapState,
    to: SwapState,
    detail: Detail,
    update: F,
) -> Result<(), Error>
where
    F: FnOnce(&mut Swap),
{
    let _ops = handle.lock_operations().await;
    if handle.state().await != from {
        return Ok(());
    }

    handle.transition_with(to, detail, update).await
}

async fn fail(handle: &SwapHandle, from: SwapState, detail: Detail) -> Result<(), Error> {
    tracing::warn!(swap_id = %handle.id, %detail, "swap failed");
    advance(handle, from, SwapState::Failed, detail, |_| {}).await
}

async fn await_own_funding(ctx: &Context, handle: &SwapHandle) -> Result<(), Error> {
    let swap = handle.snapshot().await;
    let own = swap.own_leg();
    let leg = own.contract()?.clone();
    let adapter = ctx.adapter(own.chain)?;

    let wait = tokio::time::timeout(
        ctx.settings.ledger.confirmation_timeout,
        ctx.retry("wait for own HTLC funding", || adapter.wait_for_funded(&leg)),
    );

    match handle.cancellable(wait).await {
        None => Ok(()),
        Some(Ok(Ok(funded))) => {
            advance(
                handle,
                SwapState::InitiatorFunding,
                SwapState::InitiatorFunded,
                Detail::Funded(funded.leg),
                |swap| {
                    swap.own_leg_mut().advance(LegStatus::Funded);
                },
            )
            .await
        }
        Some(Ok(Err(e))) => {
            fail(handle, SwapState::InitiatorFunding, Detail::Failed(e.to_string())).await
        }
        Some(Err(_)) => {
            let reason = ledger::Error::Timeout.to_string();
            fail(handle, SwapState::InitiatorFunding, Detail::Failed(reason)).await
        }
    }
}

/// The initiator looks for the participant's HTLC and never accepts one that
/// differs from the agreed terms.
async fn await_counterparty(ctx: &Context, handle: &SwapHandle) -> Result<(), Error> {
    let swap = handle.snapshot().await;
    let counter = swap.counter_leg();
    let adapter = ctx.adapter(counter.chain)?;

    let observed = match ctx
        .retry("look up the counterparty HTLC", || {
            adapter.find_htlc(&counter.recipient, &swap.secret_hash)
        })
        .await?
    {
        Some(observed) => observed,
        None => {
            tracing::trace!("counterparty HTLC not seen yet");
            return Ok(());
        }
    };

    let expected = LegTerms {
        chain: counter.chain,
        recipient: counter.recipient.clone(),
        amount: counter.amount.clone(),
    };
    let checked = verify::terms(&observed, &swap.secret_hash, &expected)
        .and_then(|()| {
            verify::timelock_gap(&ctx.policy, swap.own_leg().timelock, observed.timelock)
        })
        .and_then(|()| match observed.status {
            LegStatus::Pending | LegStatus::Funded => Ok(()),
            status => Err(Mismatch::NotFunded(status)),
        });
    if let Err(mismatch) = checked {
        return fail(
            handle,
            SwapState::WaitingCounterparty,
            Detail::CounterpartyMismatch(mismatch),
        )
        .await;
    }

    let leg = observed.leg.clone();
    if observed.status == LegStatus::Pending {
        tracing::debug!(htlc = %leg, "counterparty HTLC pending");
        let wait = tokio::time::timeout(
            ctx.settings.ledger.confirmation_timeout,
            ctx.retry("wait for counterparty HTLC funding", || {
                adapter.wait_for_funded(&leg)
            }),
        );

        match handle.cancellable(wait).await {
            None => return Ok(()),
            Some(Ok(result)) => {
                result?;
            }
            Some(Err(_)) => {
                tracing::info!(htlc = %leg, "counterparty HTLC still unconfirmed");
                return Ok(());
            }
        }
    }

    advance(
        handle,
        SwapState::WaitingCounterparty,
        SwapState::CounterpartyFunded,
        Detail::CounterpartyFunded(leg.clone()),
        |swap| {
            let counter = swap.counter_leg_mut();
            counter.contract_ref = Some(leg);
            counter.timelock = observed.timelock;
            counter.advance(LegStatus::Funded);
        },
    )
    .await
}

/// The participant verified the initiator's HTLC before locking anything,
/// it only has to still be there.
async fn confirm_counterparty(ctx: &Context, handle: &SwapHandle) -> Result<(), Error> {
    let swap = handle.snapshot().await;
    let counter = swap.counter_leg();
    let leg = counter.contract()?.clone();
    let adapter = ctx.adapter(counter.chain)?;

    match ctx
        .retry("query counterparty HTLC", || adapter.query_status(&leg))
        .await?
    {
        LegStatus::Funded => {
            advance(
                handle,
                SwapState::WaitingCounterparty,
                SwapState::CounterpartyFunded,
                Detail::CounterpartyFunded(leg),
                |_| {},
            )
            .await
        }
        LegStatus::NotCreated | LegStatus::Pending => Ok(()),
        status => {
            fail(
                handle,
                SwapState::WaitingCounterparty,
                Detail::CounterpartyMismatch(Mismatch::NotFunded(status)),
            )
            .await
        }
    }
}

/// A participant learns the secret once the initiator redeems the
/// participant leg.
async fn learn_secret(ctx: &Context, handle: &SwapHandle) -> Result<(), Error> {
    let swap = handle.snapshot().await;
    if swap.role != Role::Participant || swap.secret_revealed {
        return Ok(());
    }

    let own = swap.own_leg();
    let leg = own.contract()?.clone();
    let adapter = ctx.adapter(own.chain)?;
    let secret = match ctx
        .retry("look up the revealed secret", || adapter.revealed_secret(&leg))
        .await?
    {
        Some(secret) => secret,
        None => return Ok(()),
    };
    if !ctx.secrets.verify(&secret, &swap.secret_hash) {
        tracing::warn!(htlc = %leg, "ignoring revealed preimage that does not match the secret hash");
        return Ok(());
    }

    let _ops = handle.lock_operations().await;
    if handle.snapshot().await.secret_revealed {
        return Ok(());
    }
    handle
        .publish_with(Detail::SecretRevealed(leg), |swap| {
            swap.own_leg_mut().advance(LegStatus::Redeemed);
            swap.learn_secret(secret);
        })
        .await;

    Ok(())
}

/// Follows this party's leg once the swap timed out. Chains that return
/// expired HTLCs by themselves finish the refund without any call to
/// `refund`.
async fn observe_refund(ctx: &Context, handle: &SwapHandle) -> Result<(), Error> {
    let swap = handle.snapshot().await;
    let own = swap.own_leg();
    let leg = own.contract()?.clone();
    let adapter = ctx.adapter(own.chain)?;

    let status = ctx
        .retry("query own HTLC", || adapter.query_status(&leg))
        .await?;

    let _ops = handle.lock_operations().await;
    let state = handle.state().await;
    match (state, status) {
        (SwapState::TimedOut, LegStatus::Refunded) => {
            handle
                .transition(SwapState::Refunding, Detail::RefundStarted)
                .await?;
            handle
                .transition_with(SwapState::Refunded, Detail::Refunded(leg), |swap| {
                    swap.own_leg_mut().advance(LegStatus::Refunded);
                })
                .await
        }
        (SwapState::Refunding, LegStatus::Refunded) => {
            handle
                .transition_with(SwapState::Refunded, Detail::Refunded(leg), |swap| {
                    swap.own_leg_mut().advance(LegStatus::Refunded);
                })
                .await
        }
        (SwapState::TimedOut, LegStatus::Redeemed) => {
            redeemed_after_timeout(ctx, handle, leg).await
        }
        _ => Ok(()),
    }
}

/// This party's leg was redeemed even though the swap timed out, so the
/// secret is public. A participant can still claim the counterparty leg
/// until that one expires too, otherwise the swap failed.
///
/// Called with the operation lock held.
async fn redeemed_after_timeout(
    ctx: &Context,
    handle: &SwapHandle,
    leg: LegRef,
) -> Result<(), Error> {
    let swap = handle.snapshot().await;
    let counter = swap.counter_leg();
    let claimable = swap.role == Role::Participant
        && counter.status == LegStatus::Funded
        && !ctx.is_expired(&ctx.adapter(counter.chain)?, counter.timelock).await?;

    if !claimable {
        let detail = Detail::Failed("own HTLC was redeemed after the swap timed out".to_owned());
        tracing::warn!(swap_id = %handle.id, %detail, "swap failed");
        return handle
            .transition_with(SwapState::Failed, detail, |swap| {
                swap.own_leg_mut().advance(LegStatus::Redeemed);
            })
            .await;
    }
    if swap.secret_revealed {
        return Ok(());
    }

    let adapter = ctx.adapter(swap.own_leg().chain)?;
    let secret = ctx
        .retry("look up the revealed secret", || adapter.revealed_secret(&leg))
        .await?;
    match secret {
        Some(secret) if ctx.secrets.verify(&secret, &swap.secret_hash) => {
            tracing::info!(swap_id = %handle.id, counterparty_timelock = %counter.timelock, "secret revealed after timeout, counterparty leg still redeemable");
            handle
                .publish_with(Detail::SecretRevealed(leg), |swap| {
                    swap.own_leg_mut().advance(LegStatus::Redeemed);
                    swap.learn_secret(secret);
                })
                .await;
        }
        Some(_) => {
            tracing::warn!(htlc = %leg, "ignoring revealed preimage that does not match the secret hash")
        }
        None => {}
    }

    Ok(())
}

pub(crate) async fn watch_expiry(ctx: Arc<Context>, handle: Arc<SwapHandle>) {
    loop {
        match handle.state().await {
            SwapState::Created | SwapState::InitiatorFunding => {}
            SwapState::InitiatorFunded
            | SwapState::WaitingCounterparty
            | SwapState::CounterpartyFunded
            | SwapState::Redeeming => {
                if let Err(e) = time_out_expired(&ctx, &handle).await {
                    tracing::warn!("failed to check timelocks: {:#}", e);
                }
            }
            SwapState::TimedOut | SwapState::Refunding => {}
            SwapState::Completed | SwapState::Refunded | SwapState::Failed => return,
        }

        tokio::time::sleep(ctx.settings.ledger.poll_interval).await;
    }
}

async fn time_out_expired(ctx: &Context, handle: &SwapHandle) -> Result<(), Error> {
    let _ops = handle.lock_operations().await;
    let swap = handle.snapshot().await;
    if !matches!(
        swap.state,
        SwapState::InitiatorFunded
            | SwapState::WaitingCounterparty
            | SwapState::CounterpartyFunded
            | SwapState::Redeeming
    ) {
        return Ok(());
    }

    for side in [Side::Counter, Side::Own] {
        let leg = match side {
            Side::Own => swap.own_leg(),
            Side::Counter => swap.counter_leg(),
        };
        if matches!(leg.status, LegStatus::Redeemed | LegStatus::Refunded) {
            continue;
        }

        let adapter = ctx.adapter(leg.chain)?;
        if ctx.is_expired(&adapter, leg.timelock).await? {
            return handle.time_out(side).await;
        }
    }

    Ok(())
}
