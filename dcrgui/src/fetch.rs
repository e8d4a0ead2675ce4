//! Background fetch replaced by every new user selection.
//!
//! A [`FetchGuard`] keeps at most one live fetch generation. Starting a new one
//! cancels the token of the previous generation, and a generation only writes
//! its result if its token is still live when it completes. The check and the
//! write happen under the slot mutex, the same one `start` takes to cancel, so
//! a late result can never land after a newer generation was started.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::BackendError;
use crate::redraw::RedrawSignal;
use crate::utils::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Fetching,
    Superseded,
    Delivered,
}

#[derive(Debug)]
struct Slot<T> {
    state: FetchState,
    generation: u64,
    cancel: Option<CancellationToken>,
    result: Option<Result<T, BackendError>>,
}

#[derive(Debug)]
pub struct FetchGuard<T> {
    label: &'static str,
    slot: Arc<Mutex<Slot<T>>>,
    runtime: Handle,
    parent: CancellationToken,
    redraw: RedrawSignal,
}

impl<T: Clone + Send + 'static> FetchGuard<T> {
    pub fn new(
        label: &'static str,
        runtime: Handle,
        parent: CancellationToken,
        redraw: RedrawSignal,
    ) -> Self {
        Self {
            label,
            slot: Arc::new(Mutex::new(Slot {
                state: FetchState::Idle,
                generation: 0,
                cancel: None,
                result: None,
            })),
            runtime,
            parent,
            redraw,
        }
    }

    /// Supersede the current fetch, if any, and start a new generation.
    /// Returns the generation number.
    pub fn start<F, Fut>(&self, fetch: F) -> u64
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
    {
        let token = self.parent.child_token();
        let generation = {
            let mut slot = lock(&self.slot);
            if let Some(previous) = slot.cancel.replace(token.clone()) {
                previous.cancel();
                if slot.state == FetchState::Fetching {
                    debug!(
                        "{}: generation {} superseded",
                        self.label, slot.generation
                    );
                }
            }
            slot.generation += 1;
            slot.state = FetchState::Fetching;
            slot.result = None;
            slot.generation
        };

        let fut = fetch(token.clone());
        let slot = self.slot.clone();
        let redraw = self.redraw.clone();
        let label = self.label;
        self.runtime.spawn(async move {
            let res = fut.await;
            let delivered = {
                let mut slot = lock(&slot);
                if token.is_cancelled() {
                    if slot.generation == generation && slot.state == FetchState::Fetching {
                        slot.state = FetchState::Superseded;
                    }
                    false
                } else {
                    slot.result = Some(res);
                    slot.state = FetchState::Delivered;
                    true
                }
            };
            if delivered {
                debug!("{}: generation {} delivered", label, generation);
                redraw.request();
            } else {
                debug!("{}: discarding result of generation {}", label, generation);
            }
        });

        generation
    }

    /// Supersede the current fetch without starting a new one.
    pub fn cancel(&self) {
        let mut slot = lock(&self.slot);
        if let Some(token) = slot.cancel.take() {
            token.cancel();
        }
        if slot.state == FetchState::Fetching {
            slot.state = FetchState::Superseded;
        }
    }

    pub fn state(&self) -> FetchState {
        lock(&self.slot).state
    }

    pub fn generation(&self) -> u64 {
        lock(&self.slot).generation
    }

    /// Result of the last delivered generation.
    pub fn result(&self) -> Option<Result<T, BackendError>> {
        lock(&self.slot).result.clone()
    }

    /// Drop the delivered result and go back to idle.
    pub fn clear(&self) {
        self.cancel();
        let mut slot = lock(&self.slot);
        slot.result = None;
        slot.state = FetchState::Idle;
    }
}
