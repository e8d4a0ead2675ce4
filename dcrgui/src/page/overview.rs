use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::{Page, PageContext, Toast};
use crate::backend::model::{
    Notification, NotificationKind, RescanProgress, SyncProgress, Transaction,
};
use crate::command::{CommandBridge, PendingCommand};
use crate::error::Error;
use crate::listener::{ListenerLifecycle, NotificationHandler};
use crate::utils::lock;

const KINDS: [NotificationKind; 3] = [
    NotificationKind::SyncProgress,
    NotificationKind::TxAndBlock,
    NotificationKind::BlocksRescan,
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverviewState {
    pub syncing: bool,
    pub synced: bool,
    pub sync_progress: Option<SyncProgress>,
    pub sync_error: Option<String>,
    pub connected_peers: u32,
    pub best_block: u32,
    /// Newest first.
    pub recent_transactions: VecDeque<Transaction>,
    pub rescan: Option<RescanProgress>,
    pub rescan_error: Option<String>,
}

impl OverviewState {
    fn apply_sync_progress(&mut self, progress: SyncProgress) {
        self.best_block = self.best_block.max(progress.best_block_height);
        self.sync_progress = Some(progress);
    }
}

struct OverviewHandler {
    state: Arc<Mutex<OverviewState>>,
    recent_transactions: usize,
}

impl NotificationHandler for OverviewHandler {
    fn on_notification(&self, notification: &Notification) -> bool {
        let mut state = lock(&self.state);
        match notification {
            Notification::SyncStarted { .. } => {
                state.syncing = true;
                state.synced = false;
                state.sync_error = None;
                false
            }
            Notification::PeersChanged { connected } => {
                state.connected_peers = *connected;
                false
            }
            Notification::SyncProgress(progress) => {
                state.syncing = true;
                state.apply_sync_progress(progress.clone());
                false
            }
            Notification::SyncCompleted => {
                state.syncing = false;
                state.synced = true;
                true
            }
            Notification::SyncCanceled { will_restart } => {
                state.syncing = *will_restart;
                false
            }
            Notification::SyncEndedWithError(e) => {
                state.syncing = false;
                state.sync_error = Some(e.clone());
                true
            }
            Notification::NewTransaction(tx) => {
                state.recent_transactions.push_front(tx.clone());
                state.recent_transactions.truncate(self.recent_transactions);
                true
            }
            Notification::BlockAttached { height, .. } => {
                state.best_block = state.best_block.max(*height);
                false
            }
            Notification::TransactionConfirmed {
                wallet_id,
                hash,
                height,
            } => {
                for tx in state.recent_transactions.iter_mut() {
                    if tx.wallet_id == *wallet_id && &tx.hash == hash {
                        tx.block_height = Some(*height);
                    }
                }
                false
            }
            Notification::RescanStarted { wallet_id } => {
                state.rescan = Some(RescanProgress {
                    wallet_id: *wallet_id,
                    current_height: 0,
                    total_headers: 0,
                    progress: 0,
                });
                state.rescan_error = None;
                false
            }
            Notification::RescanProgress(progress) => {
                state.rescan = Some(progress.clone());
                false
            }
            Notification::RescanEnded { error, .. } => {
                state.rescan = None;
                state.rescan_error = error.clone();
                true
            }
            _ => false,
        }
    }
}

/// Sync status, best block and latest transactions of every wallet.
pub struct OverviewPage {
    ctx: PageContext,
    state: Arc<Mutex<OverviewState>>,
    listeners: ListenerLifecycle,
    bridge: CommandBridge,
    refresh: Option<PendingCommand<SyncProgress>>,
}

impl OverviewPage {
    pub fn new(ctx: PageContext) -> Self {
        let state = Arc::new(Mutex::new(OverviewState::default()));
        let handler = Arc::new(OverviewHandler {
            state: state.clone(),
            recent_transactions: ctx.config.recent_transactions,
        });
        let listeners = ctx.listeners(ctx.page_key("overview"), handler);
        let bridge = ctx.bridge();
        Self {
            ctx,
            state,
            listeners,
            bridge,
            refresh: None,
        }
    }

    pub fn state(&self) -> OverviewState {
        lock(&self.state).clone()
    }

    pub fn is_listening(&self, kind: NotificationKind) -> bool {
        self.listeners.is_registered(kind)
    }

    /// Ask the backend for the sync status. Used when sync notifications are
    /// not available.
    pub fn refresh(&mut self) -> Result<(), Error> {
        if let Some(pending) = &self.refresh {
            return Err(Error::Busy(pending.label()));
        }
        let backend = self.ctx.backend.clone();
        self.refresh = Some(
            self.bridge
                .run("sync status refresh", async move { backend.sync_status().await }),
        );
        Ok(())
    }
}

impl Page for OverviewPage {
    fn id(&self) -> &'static str {
        "overview"
    }

    fn on_navigated_to(&mut self) {
        self.listeners.activate(&KINDS);
        if !self.listeners.is_registered(NotificationKind::SyncProgress) {
            warn!("No sync notifications, polling the sync status instead");
            if let Err(e) = self.refresh() {
                info!("{}", e);
            }
        }
    }

    fn handle_frame(&mut self) -> Vec<Toast> {
        let res = match self.refresh.as_mut().and_then(|cmd| cmd.try_recv()) {
            Some(res) => res,
            None => return Vec::new(),
        };
        self.refresh = None;
        match res {
            Ok(progress) => {
                lock(&self.state).apply_sync_progress(progress);
                self.ctx.redraw.request();
                Vec::new()
            }
            Err(e) => vec![e.into()],
        }
    }

    fn on_navigated_from(&mut self) {
        self.listeners.deactivate();
    }
}
