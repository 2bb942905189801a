//! Per swap stream of state changes for the UI.
//!
//! The feed keeps every event of a swap. A subscriber first receives the
//! current state as a synthetic [`Detail::Snapshot`] event and then every
//! event published after it, so reconnecting never leaves a gap.

use crate::{
    error::{Mismatch, PartialRedeemWarning},
    ledger::{Chain, LegRef},
    swap::{SwapId, SwapState},
    timestamp::Timestamp,
};
use futures::Stream;
use genawaiter::sync::Gen;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{watch, Mutex};

#[derive(Clone, Debug, PartialEq)]
pub struct StatusEvent {
    pub timestamp: OffsetDateTime,
    pub swap_id: SwapId,
    pub previous: SwapState,
    pub new: SwapState,
    pub detail: Detail,
}

impl StatusEvent {
    pub fn new(swap_id: SwapId, previous: SwapState, new: SwapState, detail: Detail) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            swap_id,
            previous,
            new,
            detail,
        }
    }

    pub fn snapshot(swap_id: SwapId, state: SwapState) -> Self {
        Self::new(swap_id, state, state, Detail::Snapshot)
    }
}

#[derive(Clone, Debug, PartialEq, strum_macros::Display)]
pub enum Detail {
    /// Synthetic first event of every subscription.
    Snapshot,
    HtlcCreated(LegRef),
    Funded(LegRef),
    /// Watching the given chain for the counterparty's HTLC.
    AwaitingCounterparty(Chain),
    CounterpartyFunded(LegRef),
    CounterpartyMismatch(Mismatch),
    RedeemStarted,
    /// The secret became public through a redeem of this HTLC.
    SecretRevealed(LegRef),
    Redeemed(LegRef),
    Expired { chain: Chain, timelock: Timestamp },
    RefundStarted,
    Refunded(LegRef),
    PartialRedeem(PartialRedeemWarning),
    Failed(String),
}

#[derive(Debug, Default)]
struct Log {
    events: Vec<StatusEvent>,
    closed: bool,
}

#[derive(Debug)]
struct Inner {
    log: Mutex<Log>,
    published: watch::Sender<usize>,
}

#[derive(Clone, Debug)]
pub struct StatusFeed {
    inner: Arc<Inner>,
}

impl Default for StatusFeed {
    fn default() -> Self {
        let (published, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                log: Mutex::new(Log::default()),
                published,
            }),
        }
    }
}

impl StatusFeed {
    /// Appends `event`. A terminal state closes the feed, subscriptions end
    /// after delivering it.
    pub(crate) async fn publish(&self, event: StatusEvent) {
        let mut log = self.inner.log.lock().await;
        if log.closed {
            tracing::warn!(swap_id = %event.swap_id, detail = %event.detail, "dropping event published after swap ended");
            return;
        }

        log.closed = event.new.is_terminal();
        log.events.push(event);
        self.inner.published.send_replace(log.events.len());
    }

    pub async fn history(&self) -> Vec<StatusEvent> {
        self.inner.log.lock().await.events.clone()
    }

    /// Subscribes from now on. The caller must make sure no event is
    /// published between reading the state in `snapshot` and this call.
    pub(crate) async fn subscribe(
        &self,
        snapshot: StatusEvent,
    ) -> impl Stream<Item = StatusEvent> + Send + 'static {
        let start = self.inner.log.lock().await.events.len();
        let inner = self.inner.clone();

        Gen::new(move |co| async move {
            let mut published = inner.published.subscribe();
            co.yield_(snapshot).await;

            let mut next = start;
            loop {
                let (pending, closed) = {
                    let log = inner.log.lock().await;
                    (log.events[next..].to_vec(), log.closed)
                };
                next += pending.len();

                for event in pending {
                    co.yield_(event).await;
                }

                if closed || published.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}
