#![warn(unused_extern_crates, missing_debug_implementations, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod harness;

use crate::harness::{
    alice_params, bitshares, bts, collect, ether, ethereum, simulated_ledger, until, World,
    ALICE_ETH, BOB_BTS, GENESIS,
};
use spectral::prelude::*;
use std::{sync::Arc, time::Duration};
use xswap::{
    feed::Detail,
    ledger::{
        self,
        simulated::{Confirmation, Operation, SimulatedLedger},
        Chain, LegStatus,
    },
    swap::LegTerms,
    Error, HashAlgorithm, Mismatch, RedeemOutcome, Secret, SecretHash, SwapState, Timestamp,
};

#[tokio::test]
async fn both_legs_fund_and_the_swap_completes() {
    let world = World::new();

    let id = world.coordinator.start(alice_params()).await.unwrap();

    let swap = world.swap(id).await;
    assert_that(&swap.participant_leg.timelock).is_equal_to(Timestamp::from(GENESIS + 3_600));
    assert_that(&swap.initiator_leg.timelock).is_equal_to(Timestamp::from(GENESIS + 7_200));
    assert_that(&swap.secret()).is_none();

    world.wait_for(id, SwapState::WaitingCounterparty).await;
    world.counterparty_locks(id, |_| {}).await;
    world.wait_for(id, SwapState::CounterpartyFunded).await;

    let outcome = world.coordinator.redeem(id).await.unwrap();

    assert_that(&outcome).is_equal_to(RedeemOutcome::Completed);
    assert_that(&world.coordinator.get_state(id).await.unwrap()).is_equal_to(SwapState::Completed);
    assert_that(&world.bts.balance().await).is_equal_to(bts("10100"));
    assert_that(&world.eth.balance().await).is_equal_to(ether("9"));

    let swap = world.swap(id).await;
    assert_that(&swap.secret_revealed).is_true();
    assert_that(&swap.secret()).is_some();
    assert_that(&swap.initiator_leg.status).is_equal_to(LegStatus::Redeemed);
    assert_that(&swap.participant_leg.status).is_equal_to(LegStatus::Redeemed);
}

#[tokio::test]
async fn unfunded_counterparty_leg_times_out_and_refunds() {
    let world = World::new();
    let id = world.coordinator.start(alice_params()).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;

    world.advance(3_600).await;
    world.wait_for(id, SwapState::TimedOut).await;

    let redeem = world.coordinator.redeem(id).await;
    assert!(matches!(redeem, Err(Error::InvalidState { .. })));

    let early = world.coordinator.refund(id).await;
    assert!(matches!(early, Err(Error::Ledger(ledger::Error::NotExpired))));
    assert_that(&world.coordinator.get_state(id).await.unwrap()).is_equal_to(SwapState::TimedOut);

    world.advance(3_600).await;
    world.coordinator.refund(id).await.unwrap();

    assert_that(&world.coordinator.get_state(id).await.unwrap()).is_equal_to(SwapState::Refunded);
    assert_that(&world.eth.balance().await).is_equal_to(ether("10"));
    assert_that(&world.eth.calls(Operation::Redeem).await).is_equal_to(0);
}

#[tokio::test]
async fn refunding_twice_is_already_refunded() {
    let world = World::new();
    let id = world.coordinator.start(alice_params()).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;
    world.advance(7_200).await;
    world.wait_for(id, SwapState::TimedOut).await;
    world.coordinator.refund(id).await.unwrap();

    let again = world.coordinator.refund(id).await.unwrap_err();

    assert_that(&again.is_already_refunded()).is_true();
    assert_that(&world.coordinator.get_state(id).await.unwrap()).is_equal_to(SwapState::Refunded);
    assert_that(&world.eth.calls(Operation::Refund).await).is_equal_to(1);
}

#[tokio::test]
async fn refund_before_timeout_is_rejected() {
    let world = World::new();
    let id = world.coordinator.start(alice_params()).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;

    let refund = world.coordinator.refund(id).await;

    assert!(matches!(refund, Err(Error::Ledger(ledger::Error::NotExpired))));
    assert_that(&world.eth.calls(Operation::Refund).await).is_equal_to(0);
}

#[tokio::test]
async fn counterparty_leg_with_wrong_amount_fails_without_revealing() {
    let world = World::new();
    let id = world.coordinator.start(alice_params()).await.unwrap();
    let events = world.coordinator.subscribe(id).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;

    world
        .counterparty_locks(id, |htlc| htlc.amount = bts("99.99999"))
        .await;
    world.wait_for(id, SwapState::Failed).await;

    let events = collect(events).await;
    let last = events.last().unwrap();
    assert!(matches!(
        last.detail,
        Detail::CounterpartyMismatch(Mismatch::Amount { .. })
    ));

    let redeem = world.coordinator.redeem(id).await;
    assert!(matches!(
        redeem,
        Err(Error::InvalidState {
            state: SwapState::Failed,
            ..
        })
    ));
    assert_that(&world.bts.calls(Operation::Redeem).await).is_equal_to(0);
    assert_that(&world.eth.calls(Operation::Redeem).await).is_equal_to(0);
    assert_that(&world.swap(id).await.secret()).is_none();
}

#[tokio::test]
async fn counterparty_leg_with_wrong_secret_hash_fails_without_revealing() {
    let world = World::new();
    let id = world.coordinator.start(alice_params()).await.unwrap();
    let events = world.coordinator.subscribe(id).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;
    let other_hash = SecretHash::new(HashAlgorithm::Sha256, &Secret::from([9u8; 32]));

    let locked_hash = other_hash.clone();
    world
        .counterparty_locks(id, move |htlc| htlc.secret_hash = locked_hash)
        .await;
    world.wait_for(id, SwapState::Failed).await;

    let events = collect(events).await;
    match &events.last().unwrap().detail {
        Detail::CounterpartyMismatch(Mismatch::SecretHash { expected, actual }) => {
            assert_that(actual).is_equal_to(&other_hash);
            assert_that(expected).is_equal_to(&world.swap(id).await.secret_hash);
        }
        detail => panic!("unexpected detail {:?}", detail),
    }
    assert_that(&world.bts.calls(Operation::Redeem).await).is_equal_to(0);
    assert_that(&world.swap(id).await.secret()).is_none();
}

#[tokio::test]
async fn pending_counterparty_wait_is_dropped_when_the_swap_times_out() {
    let bts_ledger = Arc::new(
        SimulatedLedger::new(Chain::BitShares, Timestamp::from(GENESIS), bts("10000"))
            .with_confirmation(Confirmation::Manual),
    );
    let world = World::with_ledgers(simulated_ledger(Chain::Ethereum), bts_ledger);
    let id = world.coordinator.start(alice_params()).await.unwrap();
    let events = world.coordinator.subscribe(id).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;

    let leg = world.counterparty_locks(id, |_| {}).await;
    until("the driver to wait for the counterparty HTLC", || {
        world.bts.pending_waits() == 1
    })
    .await;

    world.advance(3_600).await;
    world.wait_for(id, SwapState::TimedOut).await;
    until("the wait to be dropped", || world.bts.pending_waits() == 0).await;

    world.bts.confirm(&leg).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_that(&world.coordinator.get_state(id).await.unwrap()).is_equal_to(SwapState::TimedOut);
    world.advance(3_600).await;
    world.coordinator.refund(id).await.unwrap();
    let events = collect(events).await;
    assert!(events
        .iter()
        .all(|event| event.new != SwapState::CounterpartyFunded));
    assert_that(&world.bts.calls(Operation::WaitForFunded).await).is_equal_to(1);
}

#[tokio::test]
async fn counterparty_leg_expiring_too_late_fails() {
    let world = World::new();
    let id = world.coordinator.start(alice_params()).await.unwrap();
    let initiator_timelock = world.swap(id).await.initiator_leg.timelock;
    let events = world.coordinator.subscribe(id).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;

    world
        .counterparty_locks(id, |htlc| htlc.timelock = initiator_timelock.minus(60))
        .await;
    world.wait_for(id, SwapState::Failed).await;

    let events = collect(events).await;
    assert!(matches!(
        events.last().unwrap().detail,
        Detail::CounterpartyMismatch(Mismatch::TimelockGap { .. })
    ));
    assert_that(&world.bts.calls(Operation::Redeem).await).is_equal_to(0);
}

#[tokio::test]
async fn bitshares_returns_expired_htlc_without_refund_call() {
    let world = World::new();
    let params = xswap::StartParams {
        own: LegTerms {
            chain: Chain::BitShares,
            recipient: bitshares(BOB_BTS),
            amount: bts("100"),
        },
        counterparty: LegTerms {
            chain: Chain::Ethereum,
            recipient: ethereum(ALICE_ETH),
            amount: ether("1"),
        },
        ..alice_params()
    };
    let id = world.coordinator.start(params).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;
    assert_that(&world.bts.balance().await).is_equal_to(bts("9900"));

    world.advance(3_600).await;
    world.wait_for(id, SwapState::TimedOut).await;
    world.advance(3_600).await;
    world.wait_for(id, SwapState::Refunded).await;

    assert_that(&world.bts.calls(Operation::Refund).await).is_equal_to(0);
    assert_that(&world.bts.balance().await).is_equal_to(bts("10000"));
    assert_that(&world.swap(id).await.own_leg().status).is_equal_to(LegStatus::Refunded);
}

#[tokio::test]
async fn concurrent_redeems_submit_once() {
    let world = World::new();
    let id = world.coordinator.start(alice_params()).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;
    world.counterparty_locks(id, |_| {}).await;
    world.wait_for(id, SwapState::CounterpartyFunded).await;

    let (first, second) = tokio::join!(
        world.coordinator.redeem(id),
        world.coordinator.redeem(id)
    );

    let completed = [&first, &second]
        .iter()
        .filter(|outcome| matches!(outcome, Ok(RedeemOutcome::Completed)))
        .count();
    let already = [&first, &second]
        .iter()
        .filter(|outcome| matches!(outcome, Err(e) if e.is_already_redeemed()))
        .count();
    assert_that(&completed).is_equal_to(1);
    assert_that(&already).is_equal_to(1);
    assert_that(&world.bts.calls(Operation::Redeem).await).is_equal_to(1);
    assert_that(&world.eth.calls(Operation::Redeem).await).is_equal_to(1);
}

#[tokio::test]
async fn failing_own_leg_redeem_is_a_partial_redeem() {
    let world = World::new();
    let id = world.coordinator.start(alice_params()).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;
    world.counterparty_locks(id, |_| {}).await;
    world.wait_for(id, SwapState::CounterpartyFunded).await;
    world
        .eth
        .fail_next(
            Operation::Redeem,
            1,
            ledger::Error::Submission("nonce too low".to_owned()),
        )
        .await;

    let outcome = world.coordinator.redeem(id).await.unwrap();

    match outcome {
        RedeemOutcome::Partial(warning) => {
            assert_that(&warning.swap_id).is_equal_to(id);
            assert_that(&warning.chain).is_equal_to(Chain::Ethereum);
        }
        RedeemOutcome::Completed => panic!("own leg redeem should have failed"),
    }
    assert_that(&world.coordinator.get_state(id).await.unwrap()).is_equal_to(SwapState::Redeeming);
    assert_that(&world.swap(id).await.secret_revealed).is_true();

    let retried = world.coordinator.redeem(id).await.unwrap();

    assert_that(&retried).is_equal_to(RedeemOutcome::Completed);
    assert_that(&world.bts.calls(Operation::Redeem).await).is_equal_to(1);
    assert_that(&world.eth.calls(Operation::Redeem).await).is_equal_to(2);
}

#[tokio::test]
async fn unavailable_chain_is_retried() {
    let world = World::new();
    let id = world.coordinator.start(alice_params()).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;
    world.counterparty_locks(id, |_| {}).await;
    world.wait_for(id, SwapState::CounterpartyFunded).await;
    world
        .bts
        .fail_next(
            Operation::Redeem,
            2,
            ledger::Error::ChainUnavailable("node syncing".to_owned()),
        )
        .await;

    let outcome = world.coordinator.redeem(id).await.unwrap();

    assert_that(&outcome).is_equal_to(RedeemOutcome::Completed);
    assert_that(&world.bts.calls(Operation::Redeem).await).is_equal_to(3);
}

#[tokio::test]
async fn exhausted_retries_leave_the_swap_redeemable() {
    let world = World::new();
    let id = world.coordinator.start(alice_params()).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;
    world.counterparty_locks(id, |_| {}).await;
    world.wait_for(id, SwapState::CounterpartyFunded).await;
    world
        .bts
        .fail_next(
            Operation::Redeem,
            3,
            ledger::Error::ChainUnavailable("connection refused".to_owned()),
        )
        .await;

    let failed = world.coordinator.redeem(id).await;

    assert!(matches!(
        failed,
        Err(Error::Ledger(ledger::Error::ChainUnavailable(_)))
    ));
    assert_that(&world.coordinator.get_state(id).await.unwrap()).is_equal_to(SwapState::Redeeming);
    assert_that(&world.swap(id).await.secret_revealed).is_false();

    let outcome = world.coordinator.redeem(id).await.unwrap();

    assert_that(&outcome).is_equal_to(RedeemOutcome::Completed);
}

#[tokio::test]
async fn finished_swap_can_be_forgotten() {
    let world = World::new();
    let id = world.coordinator.start(alice_params()).await.unwrap();
    world.wait_for(id, SwapState::WaitingCounterparty).await;

    let busy = world.coordinator.forget(id).await;
    assert!(matches!(busy, Err(Error::InvalidState { .. })));

    world.counterparty_locks(id, |_| {}).await;
    world.wait_for(id, SwapState::CounterpartyFunded).await;
    world.coordinator.redeem(id).await.unwrap();

    let swap = world.coordinator.forget(id).await.unwrap();

    assert_that(&swap.state).is_equal_to(SwapState::Completed);
    assert_that(&world.coordinator.swap_ids().await).is_empty();
    assert!(matches!(
        world.coordinator.get_state(id).await,
        Err(Error::NotFound(_))
    ));
}
