//! Pages compose the coordination primitives: a listener lifecycle for push
//! notifications, command bridges for user actions and fetch guards for
//! lookups replaced by every new selection.

pub mod dex;
pub mod overview;
pub mod proposal;

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::Backend;
use crate::command::CommandBridge;
use crate::config::Config;
use crate::error::Error;
use crate::listener::{ListenerLifecycle, NotificationHandler};
use crate::redraw::RedrawSignal;

pub use dex::{DexPage, DexState};
pub use overview::{OverviewPage, OverviewState};
pub use proposal::ProposalPage;

pub trait Page {
    /// Name of the page, used in logs.
    fn id(&self) -> &'static str;
    fn on_navigated_to(&mut self);
    /// Called by the frame loop before every render. Returns the outcomes of
    /// the commands that completed since the last frame.
    fn handle_frame(&mut self) -> Vec<Toast> {
        Vec::new()
    }
    fn on_navigated_from(&mut self);
}

/// Short-lived message shown to the user after a command completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toast {
    Success(String),
    Error(String),
}

impl From<Error> for Toast {
    fn from(e: Error) -> Self {
        Toast::Error(e.to_string())
    }
}

/// Everything a page needs from the application.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub backend: Arc<dyn Backend>,
    pub runtime: Handle,
    pub redraw: RedrawSignal,
    /// Cancelled when the application shuts down.
    pub shutdown: CancellationToken,
    pub config: Config,
}

impl PageContext {
    pub fn new(backend: Arc<dyn Backend>, runtime: Handle, config: Config) -> Self {
        Self {
            backend,
            runtime,
            redraw: RedrawSignal::new(),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Listener key unique to one page instance.
    pub fn page_key(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, Uuid::new_v4())
    }

    pub fn bridge(&self) -> CommandBridge {
        CommandBridge::new(self.runtime.clone())
    }

    pub fn listeners(
        &self,
        key: String,
        handler: Arc<dyn NotificationHandler>,
    ) -> ListenerLifecycle {
        ListenerLifecycle::new(
            key,
            self.backend.clone(),
            handler,
            self.runtime.clone(),
            self.redraw.clone(),
            self.shutdown.clone(),
            self.config.notification_buffer,
        )
    }
}
