//! Runs one swap as the initiator against in-memory ledgers, playing the
//! participant by hand.

use crate::cli::{Scenario, Simulate};
use anyhow::{bail, Context, Result};
use futures::{Stream, StreamExt};
use std::{sync::Arc, time::Duration};
use xswap::{
    asset::{Amount, Asset},
    config::Settings,
    feed::StatusEvent,
    identity::{BitShares, Ethereum, Identity},
    ledger::{simulated::SimulatedLedger, Chain, HtlcParams, LedgerAdapter},
    swap::LegTerms,
    Coordinator, RedeemOutcome, Role, StartParams, SwapId, SwapState, Timestamp,
};

const PARTICIPANT_ADDRESS: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";
const INITIATOR_ACCOUNT: &str = "alice";

/// Simulated ledgers answer right away, there is no point in polling them at
/// the configured pace.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub async fn run(mut settings: Settings, args: Simulate) -> Result<()> {
    settings.ledger.poll_interval = POLL_INTERVAL;

    let genesis = Timestamp::now();
    let eth = Arc::new(SimulatedLedger::new(
        Chain::Ethereum,
        genesis,
        Amount::from_base_units(Asset::ether(), args.ether.base_units() * 2u8),
    ));
    let bts = Arc::new(SimulatedLedger::new(
        Chain::BitShares,
        genesis,
        Amount::from_base_units(Asset::bts(), 0u8),
    ));
    let adapters: Vec<Arc<dyn LedgerAdapter>> = vec![eth.clone(), bts.clone()];
    let coordinator = Coordinator::new(settings, adapters);

    let params = StartParams {
        role: Role::Initiator,
        own: LegTerms {
            chain: Chain::Ethereum,
            recipient: Identity::from(PARTICIPANT_ADDRESS.parse::<Ethereum>()?),
            amount: args.ether.clone(),
        },
        counterparty: LegTerms {
            chain: Chain::BitShares,
            recipient: Identity::from(INITIATOR_ACCOUNT.parse::<BitShares>()?),
            amount: args.bts.clone(),
        },
        desired_window: args.window,
        secret_hash: None,
    };
    let id = coordinator
        .start(params)
        .await
        .context("failed to start swap")?;
    println!("started swap {} ({} scenario)", id, args.scenario);

    let mut events = Box::pin(coordinator.subscribe(id).await?);
    print_until(&mut events, SwapState::WaitingCounterparty).await?;

    match args.scenario {
        Scenario::Happy => {
            lock_participant_leg(&coordinator, &bts, id, |_| {}).await?;
            print_until(&mut events, SwapState::CounterpartyFunded).await?;

            match coordinator.redeem(id).await? {
                RedeemOutcome::Completed => {}
                RedeemOutcome::Partial(warning) => println!("warning: {}", warning),
            }
        }
        Scenario::Timeout => {
            let swap = coordinator.swap(id).await?;
            let participant_expiry = genesis.until(swap.participant_leg.timelock);
            let initiator_expiry = swap.participant_leg.timelock.until(swap.initiator_leg.timelock);

            advance(&eth, &bts, participant_expiry.into()).await;
            print_until(&mut events, SwapState::TimedOut).await?;
            advance(&eth, &bts, initiator_expiry.into()).await;

            coordinator.refund(id).await?;
        }
        Scenario::Mismatch => {
            lock_participant_leg(&coordinator, &bts, id, |htlc| {
                let short = htlc.amount.base_units() - 1u8;
                htlc.amount = Amount::from_base_units(Asset::bts(), short);
            })
            .await?;
        }
    }

    while let Some(event) = events.next().await {
        print_event(&event);
    }

    let swap = coordinator.swap(id).await?;
    println!(
        "final state {}, ETH balance {}, BTS balance {}",
        swap.state,
        eth.balance().await,
        bts.balance().await
    );

    Ok(())
}

/// Plays the participant: locks the BTS leg the initiator asked for, after
/// applying `tweak`.
async fn lock_participant_leg<F>(
    coordinator: &Coordinator,
    bts: &SimulatedLedger,
    id: SwapId,
    tweak: F,
) -> Result<()>
where
    F: FnOnce(&mut HtlcParams),
{
    let swap = coordinator.swap(id).await?;
    let mut htlc = HtlcParams {
        recipient: swap.participant_leg.recipient.clone(),
        amount: swap.participant_leg.amount.clone(),
        secret_hash: swap.secret_hash.clone(),
        timelock: swap.participant_leg.timelock,
    };
    tweak(&mut htlc);

    let leg = bts.lock_counterparty_htlc(htlc).await;
    println!("participant locked {}", leg);

    Ok(())
}

async fn advance(eth: &SimulatedLedger, bts: &SimulatedLedger, seconds: u32) {
    println!("advancing ledger time by {}s", seconds);
    eth.advance(seconds).await;
    bts.advance(seconds).await;
}

async fn print_until<S>(events: &mut S, state: SwapState) -> Result<()>
where
    S: Stream<Item = StatusEvent> + Unpin,
{
    while let Some(event) = events.next().await {
        print_event(&event);
        if event.new == state {
            return Ok(());
        }
    }

    bail!("swap ended before reaching {}", state)
}

fn print_event(event: &StatusEvent) {
    println!(
        "[{}] {} -> {}: {:?}",
        event.timestamp, event.previous, event.new, event.detail
    );
}
