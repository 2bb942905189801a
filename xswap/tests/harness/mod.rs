use futures::{Stream, StreamExt};
use std::{sync::Arc, time::Duration};
use xswap::{
    asset::{Amount, Asset},
    config::{settings, Settings},
    feed::StatusEvent,
    identity::{BitShares, Ethereum, Identity},
    ledger::{simulated::SimulatedLedger, Chain, HtlcParams, LedgerAdapter, LegRef},
    swap::LegTerms,
    Coordinator, RelativeTime, Role, StartParams, Swap, SwapId, SwapState, Timestamp,
};

pub const GENESIS: u32 = 1_600_000_000;
pub const WINDOW: u32 = 7_200;

/// Alice initiates on Ethereum, Bob participates on BitShares.
pub const ALICE_ETH: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const BOB_ETH: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";
pub const ALICE_BTS: &str = "alice";
pub const BOB_BTS: &str = "bob-trader";

pub fn settings() -> Settings {
    Settings {
        ledger: settings::Ledger {
            confirmation_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
        },
        retry: settings::Retry {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        },
        ..Settings::default()
    }
}

pub fn ether(amount: &str) -> Amount {
    Amount::parse(Asset::ether(), amount).unwrap()
}

pub fn bts(amount: &str) -> Amount {
    Amount::parse(Asset::bts(), amount).unwrap()
}

pub fn ethereum(address: &str) -> Identity {
    Identity::from(address.parse::<Ethereum>().unwrap())
}

pub fn bitshares(account: &str) -> Identity {
    Identity::from(account.parse::<BitShares>().unwrap())
}

pub fn simulated_ledger(chain: Chain) -> Arc<SimulatedLedger> {
    let balance = match chain {
        Chain::Ethereum => ether("10"),
        Chain::BitShares => bts("10000"),
    };

    Arc::new(SimulatedLedger::new(chain, Timestamp::from(GENESIS), balance))
}

pub fn eth_leg() -> LegTerms {
    LegTerms {
        chain: Chain::Ethereum,
        recipient: ethereum(BOB_ETH),
        amount: ether("1.0"),
    }
}

pub fn bts_leg() -> LegTerms {
    LegTerms {
        chain: Chain::BitShares,
        recipient: bitshares(ALICE_BTS),
        amount: bts("100"),
    }
}

/// Alice locks ether for Bob and expects BTS in return.
pub fn alice_params() -> StartParams {
    StartParams {
        role: Role::Initiator,
        own: eth_leg(),
        counterparty: bts_leg(),
        desired_window: RelativeTime::new(WINDOW),
        secret_hash: None,
    }
}

/// Both ledgers seen from one party.
#[derive(Debug)]
pub struct World {
    pub eth: Arc<SimulatedLedger>,
    pub bts: Arc<SimulatedLedger>,
    pub coordinator: Coordinator,
}

impl World {
    pub fn new() -> Self {
        Self::with_ledgers(simulated_ledger(Chain::Ethereum), simulated_ledger(Chain::BitShares))
    }

    pub fn with_ledgers(eth: Arc<SimulatedLedger>, bts: Arc<SimulatedLedger>) -> Self {
        let adapters: Vec<Arc<dyn LedgerAdapter>> = vec![eth.clone(), bts.clone()];
        let coordinator = Coordinator::new(settings(), adapters);

        Self {
            eth,
            bts,
            coordinator,
        }
    }

    pub async fn advance(&self, seconds: u32) {
        self.eth.advance(seconds).await;
        self.bts.advance(seconds).await;
    }

    pub async fn swap(&self, id: SwapId) -> Swap {
        self.coordinator.swap(id).await.unwrap()
    }

    pub async fn wait_for(&self, id: SwapId, state: SwapState) {
        wait_for(&self.coordinator, id, state).await
    }

    /// Plays Bob: locks the BTS leg Alice expects, with `tweak` applied.
    pub async fn counterparty_locks<F>(&self, id: SwapId, tweak: F) -> LegRef
    where
        F: FnOnce(&mut HtlcParams),
    {
        let swap = self.swap(id).await;
        let mut params = HtlcParams {
            recipient: swap.participant_leg.recipient.clone(),
            amount: swap.participant_leg.amount.clone(),
            secret_hash: swap.secret_hash.clone(),
            timelock: swap.participant_leg.timelock,
        };
        tweak(&mut params);

        self.bts.lock_counterparty_htlc(params).await
    }
}

pub async fn wait_for(coordinator: &Coordinator, id: SwapId, state: SwapState) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if coordinator.get_state(id).await.unwrap() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    if reached.is_err() {
        panic!(
            "swap never reached {}, stuck in {}",
            state,
            coordinator.get_state(id).await.unwrap()
        );
    }
}

/// Collects events until the feed ends.
pub async fn collect(stream: impl Stream<Item = StatusEvent>) -> Vec<StatusEvent> {
    tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
        .await
        .expect("feed did not end")
}

/// Polls `condition` until it holds.
pub async fn until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    assert!(reached.is_ok(), "timed out waiting for {}", what);
}
