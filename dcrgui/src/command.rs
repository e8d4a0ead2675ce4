//! Bridge between the render pass and blocking backend calls.
//!
//! [`CommandBridge::run`] spawns one task that awaits the backend call once and
//! sends its outcome on a dedicated oneshot channel. The render pass polls the
//! returned [`PendingCommand`] every frame and never blocks on it.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::backend::BackendError;
use crate::error::Error;

#[derive(Debug, Clone)]
pub struct CommandBridge {
    runtime: Handle,
}

impl CommandBridge {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    pub fn run<T, F>(&self, label: &'static str, op: F) -> PendingCommand<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, BackendError>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.runtime.spawn(async move {
            let res = op.await;
            deliver(label, sender, res);
        });
        PendingCommand::new(label, receiver)
    }

    /// Same as [`CommandBridge::run`] for calls that block the thread.
    pub fn run_blocking<T, F>(&self, label: &'static str, op: F) -> PendingCommand<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, BackendError> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.runtime.spawn_blocking(move || {
            let res = op();
            deliver(label, sender, res);
        });
        PendingCommand::new(label, receiver)
    }
}

fn deliver<T>(
    label: &'static str,
    sender: oneshot::Sender<Result<T, BackendError>>,
    res: Result<T, BackendError>,
) {
    if let Err(e) = &res {
        debug!("{} failed: {}", label, e);
    }
    if sender.send(res).is_err() {
        warn!("{} finished but nobody is waiting for its result", label);
    }
}

/// Receiving end of a command. Yields its outcome exactly once.
#[derive(Debug)]
pub struct PendingCommand<T> {
    label: &'static str,
    receiver: Option<oneshot::Receiver<Result<T, BackendError>>>,
}

impl<T> PendingCommand<T> {
    fn new(label: &'static str, receiver: oneshot::Receiver<Result<T, BackendError>>) -> Self {
        Self {
            label,
            receiver: Some(receiver),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// True once the outcome was handed out.
    pub fn is_delivered(&self) -> bool {
        self.receiver.is_none()
    }

    /// Non-blocking poll. Returns `None` while the command is running and after
    /// the outcome was delivered.
    pub fn try_recv(&mut self) -> Option<Result<T, Error>> {
        let receiver = self.receiver.as_mut()?;
        let outcome = match receiver.try_recv() {
            Ok(res) => res.map_err(Error::from),
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => Err(Error::CommandAborted(self.label)),
        };
        self.receiver = None;
        Some(outcome)
    }

    /// Wait for the outcome.
    pub async fn recv(mut self) -> Result<T, Error> {
        match self.receiver.take() {
            Some(receiver) => match receiver.await {
                Ok(res) => res.map_err(Error::from),
                Err(_) => Err(Error::CommandAborted(self.label)),
            },
            None => Err(Error::AlreadyDelivered(self.label)),
        }
    }
}
