use crate::{
    error::Error,
    feed::{Detail, StatusEvent, StatusFeed},
    ledger::LegStatus,
    swap::{Swap, SwapId, SwapState},
};
use futures::{future::AbortHandle, Stream};
use std::future::Future;
use tokio::sync::{Mutex, MutexGuard};

/// One of the two legs, relative to this party.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Side {
    Own,
    Counter,
}

#[derive(Debug, Default)]
struct Waits {
    current: Option<AbortHandle>,
    cancelled: bool,
}

/// Everything the coordinator keeps about one swap.
#[derive(Debug)]
pub(crate) struct SwapHandle {
    pub id: SwapId,
    swap: Mutex<Swap>,
    feed: StatusFeed,
    /// Held for the whole of every mutating operation, on chain calls
    /// included, so at most one of them is in flight per swap.
    operations: Mutex<()>,
    waits: Mutex<Waits>,
}

impl SwapHandle {
    pub fn new(swap: Swap) -> Self {
        Self {
            id: swap.id,
            swap: Mutex::new(swap),
            feed: StatusFeed::default(),
            operations: Mutex::new(()),
            waits: Mutex::new(Waits::default()),
        }
    }

    pub async fn lock_operations(&self) -> MutexGuard<'_, ()> {
        self.operations.lock().await
    }

    pub async fn snapshot(&self) -> Swap {
        self.swap.lock().await.clone()
    }

    pub async fn state(&self) -> SwapState {
        self.swap.lock().await.state
    }

    pub async fn transition(&self, next: SwapState, detail: Detail) -> Result<(), Error> {
        self.transition_with(next, detail, |_| {}).await
    }

    /// Applies `update` and moves to `next` in one step, the feed never
    /// shows one without the other.
    pub async fn transition_with<F>(
        &self,
        next: SwapState,
        detail: Detail,
        update: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut Swap),
    {
        let mut swap = self.swap.lock().await;
        let previous = swap.state;
        if !previous.can_transition_to(next) {
            return Err(Error::IllegalTransition {
                from: previous,
                to: next,
            });
        }

        update(&mut swap);
        swap.state = next;

        tracing::info!(swap_id = %self.id, from = %previous, to = %next, detail = %detail, "swap state changed");
        self.feed
            .publish(StatusEvent::new(self.id, previous, next, detail))
            .await;

        if matches!(next, SwapState::TimedOut | SwapState::Failed) {
            self.cancel_waits().await;
        }

        Ok(())
    }

    /// Moves the swap to `TimedOut` because the leg on `side` expired.
    pub async fn time_out(&self, side: Side) -> Result<(), Error> {
        let detail = {
            let swap = self.swap.lock().await;
            let leg = match side {
                Side::Own => swap.own_leg(),
                Side::Counter => swap.counter_leg(),
            };
            Detail::Expired {
                chain: leg.chain,
                timelock: leg.timelock,
            }
        };

        self.transition_with(SwapState::TimedOut, detail, |swap| {
            let leg = match side {
                Side::Own => swap.own_leg_mut(),
                Side::Counter => swap.counter_leg_mut(),
            };
            if leg.status == LegStatus::Funded {
                leg.advance(LegStatus::Expired);
            }
        })
        .await
    }

    /// Records progress that does not change the swap state.
    pub async fn publish_with<F>(&self, detail: Detail, update: F)
    where
        F: FnOnce(&mut Swap),
    {
        let mut swap = self.swap.lock().await;
        update(&mut swap);

        tracing::info!(swap_id = %self.id, state = %swap.state, detail = %detail, "swap progressed");
        self.feed
            .publish(StatusEvent::new(self.id, swap.state, swap.state, detail))
            .await;
    }

    pub async fn subscribe(&self) -> impl Stream<Item = StatusEvent> + Send + 'static {
        let swap = self.swap.lock().await;

        self.feed
            .subscribe(StatusEvent::snapshot(self.id, swap.state))
            .await
    }

    /// Runs `future` until it completes or the swap times out or fails,
    /// whichever comes first.
    pub async fn cancellable<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future,
    {
        let (future, handle) = futures::future::abortable(future);
        {
            let mut waits = self.waits.lock().await;
            if waits.cancelled {
                return None;
            }
            waits.current = Some(handle);
        }

        let output = future.await.ok();
        self.waits.lock().await.current = None;

        output
    }

    async fn cancel_waits(&self) {
        let mut waits = self.waits.lock().await;
        waits.cancelled = true;
        if let Some(handle) = waits.current.take() {
            tracing::debug!(swap_id = %self.id, "cancelling pending wait");
            handle.abort();
        }
    }
}
