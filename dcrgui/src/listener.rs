//! Backend notification subscriptions of a page.
//!
//! A page owns one [`ListenerLifecycle`]. Activating it registers one
//! [`ChannelListener`] per notification kind under the page key and spawns one
//! dispatch task per kind, reading the listener channel until the page token is
//! cancelled or the channel is closed. Deactivating it cancels the token,
//! unregisters every listener and only then closes its channel.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::backend::{
    model::{Notification, NotificationKind},
    Backend,
};
use crate::redraw::RedrawSignal;
use crate::utils::lock;

/// Handle given to the backend, which pushes the events of one kind to it.
pub trait Listener: Debug + Send + Sync {
    fn on_notify(&self, notification: Notification);
    /// Stop accepting notifications. Calling it more than once is a no-op.
    fn close(&self);
}

/// Page side of the subscription: applies a notification to the page state.
pub trait NotificationHandler: Send + Sync {
    /// Returns true if the change must be shown to the user right away.
    fn on_notification(&self, notification: &Notification) -> bool;
}

/// Listener forwarding the notifications of a single kind into a bounded
/// channel.
#[derive(Debug)]
pub struct ChannelListener {
    kind: NotificationKind,
    sender: Mutex<Option<mpsc::Sender<Notification>>>,
}

impl ChannelListener {
    pub fn new(
        kind: NotificationKind,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Arc::new(Self {
                kind,
                sender: Mutex::new(Some(sender)),
            }),
            receiver,
        )
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.sender).is_none()
    }
}

impl Listener for ChannelListener {
    fn on_notify(&self, notification: Notification) {
        if notification.kind() != self.kind {
            debug!(
                "{} listener ignoring {:?}",
                self.kind,
                notification.kind()
            );
            return;
        }
        let sender = lock(&self.sender);
        if let Some(sender) = sender.as_ref() {
            match sender.try_send(notification) {
                Ok(()) => {}
                Err(TrySendError::Full(n)) => {
                    warn!("{} notification channel is full, dropping {:?}", self.kind, n)
                }
                Err(TrySendError::Closed(n)) => {
                    debug!("{} dispatcher is gone, dropping {:?}", self.kind, n)
                }
            }
        } else {
            debug!("{} listener is closed, dropping notification", self.kind);
        }
    }

    fn close(&self) {
        if lock(&self.sender).take().is_some() {
            debug!("{} listener closed", self.kind);
        }
    }
}

struct ListenerHandle {
    listener: Arc<ChannelListener>,
    dispatcher: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct DispatchCounter {
    live: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the live counter when the dispatch loop exits, whatever the
/// reason.
struct DispatchGuard(Arc<DispatchCounter>);

impl DispatchGuard {
    fn enter(counter: Arc<DispatchCounter>) -> Self {
        let live = counter.live.fetch_add(1, Ordering::SeqCst) + 1;
        counter.peak.fetch_max(live, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ListenerLifecycle {
    key: String,
    backend: Arc<dyn Backend>,
    handler: Arc<dyn NotificationHandler>,
    runtime: Handle,
    redraw: RedrawSignal,
    parent: CancellationToken,
    capacity: usize,
    token: Option<CancellationToken>,
    handles: BTreeMap<NotificationKind, ListenerHandle>,
    /// Dispatchers of deactivated listeners that may still be running.
    retired: BTreeMap<NotificationKind, JoinHandle<()>>,
    counters: BTreeMap<NotificationKind, Arc<DispatchCounter>>,
}

impl ListenerLifecycle {
    pub fn new(
        key: String,
        backend: Arc<dyn Backend>,
        handler: Arc<dyn NotificationHandler>,
        runtime: Handle,
        redraw: RedrawSignal,
        parent: CancellationToken,
        capacity: usize,
    ) -> Self {
        Self {
            key,
            backend,
            handler,
            runtime,
            redraw,
            parent,
            capacity,
            token: None,
            handles: BTreeMap::new(),
            retired: BTreeMap::new(),
            counters: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_registered(&self, kind: NotificationKind) -> bool {
        self.handles.contains_key(&kind)
    }

    pub fn registered_kinds(&self) -> Vec<NotificationKind> {
        self.handles.keys().copied().collect()
    }

    /// Number of dispatch loops currently running for this kind.
    pub fn live_dispatchers(&self, kind: NotificationKind) -> usize {
        self.counters
            .get(&kind)
            .map(|c| c.live.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Register a listener and start its dispatcher for every kind that is not
    /// registered yet. A kind that fails to register is left unmonitored.
    pub fn activate(&mut self, kinds: &[NotificationKind]) {
        let token = match &self.token {
            Some(token) => token.clone(),
            None => {
                let token = self.parent.child_token();
                self.token = Some(token.clone());
                token
            }
        };

        for kind in kinds {
            if self.handles.contains_key(kind) {
                debug!("{}: {} listener is already active", self.key, kind);
                continue;
            }

            let (listener, receiver) = ChannelListener::new(*kind, self.capacity);
            if let Err(e) = self
                .backend
                .add_listener(*kind, &self.key, listener.clone())
            {
                error!(
                    "{}: failed to register {} listener: {}",
                    self.key, kind, e
                );
                continue;
            }

            let counter = self.counters.entry(*kind).or_default().clone();
            // The dispatcher of a previous activation may not have observed its
            // cancellation yet, the new loop only starts once it has exited.
            let previous = self.retired.remove(kind);
            let dispatcher = self.runtime.spawn(dispatch(
                format!("{}/{}", self.key, kind),
                receiver,
                token.clone(),
                self.handler.clone(),
                self.redraw.clone(),
                counter,
                previous,
            ));
            debug!("{}: {} listener registered", self.key, kind);
            self.handles.insert(
                *kind,
                ListenerHandle {
                    listener,
                    dispatcher,
                },
            );
        }
    }

    /// Cancel the dispatchers, unregister every listener and close their
    /// channels. No-op if the lifecycle is not active.
    pub fn deactivate(&mut self) {
        let token = match self.token.take() {
            Some(token) => token,
            None => return,
        };
        token.cancel();

        for (kind, handle) in std::mem::take(&mut self.handles) {
            self.backend.remove_listener(kind, &self.key);
            // The backend no longer holds the listener, closing is safe.
            handle.listener.close();
            self.retired.insert(kind, handle.dispatcher);
            debug!("{}: {} listener unregistered", self.key, kind);
        }
    }

    /// Wait for every dispatcher of a deactivated listener to exit.
    pub async fn join_retired(&mut self) {
        for (kind, handle) in std::mem::take(&mut self.retired) {
            if let Err(e) = handle.await {
                error!("{}: {} dispatcher failed: {}", self.key, kind, e);
            }
        }
    }
}

impl Drop for ListenerLifecycle {
    fn drop(&mut self) {
        self.deactivate();
    }
}

async fn dispatch(
    name: String,
    mut receiver: mpsc::Receiver<Notification>,
    token: CancellationToken,
    handler: Arc<dyn NotificationHandler>,
    redraw: RedrawSignal,
    counter: Arc<DispatchCounter>,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            error!("{}: previous dispatcher failed: {}", name, e);
        }
    }
    let _guard = DispatchGuard::enter(counter);
    debug!("{}: dispatcher started", name);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = receiver.recv() => match received {
                Some(notification) => {
                    if handler.on_notification(&notification) {
                        redraw.request();
                    }
                }
                // Closed during teardown, not a notification.
                None => break,
            },
        }
    }

    debug!("{}: dispatcher stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::testutils::{block_attached, wait_until, Recorder};
    use std::time::Duration;

    const KEY: &str = "test-page";

    fn lifecycle(backend: Arc<MockBackend>, recorder: Arc<Recorder>) -> ListenerLifecycle {
        ListenerLifecycle::new(
            KEY.to_string(),
            backend,
            recorder,
            Handle::current(),
            RedrawSignal::new(),
            CancellationToken::new(),
            8,
        )
    }

    #[tokio::test]
    async fn activate_twice_registers_once() {
        let backend = Arc::new(MockBackend::new());
        let recorder = Arc::new(Recorder::default());
        let mut listeners = lifecycle(backend.clone(), recorder.clone());

        listeners.activate(&[NotificationKind::SyncProgress, NotificationKind::TxAndBlock]);
        listeners.activate(&[NotificationKind::SyncProgress, NotificationKind::TxAndBlock]);

        wait_until(|| listeners.live_dispatchers(NotificationKind::SyncProgress) == 1).await;
        wait_until(|| listeners.live_dispatchers(NotificationKind::TxAndBlock) == 1).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        for kind in [NotificationKind::SyncProgress, NotificationKind::TxAndBlock] {
            assert_eq!(backend.registrations(kind), 1);
            assert_eq!(backend.listener_count(kind), 1);
            assert_eq!(listeners.live_dispatchers(kind), 1);
        }
        assert_eq!(listeners.live_dispatchers(NotificationKind::Governance), 0);

        // One registration means one delivery.
        assert_eq!(backend.emit(Notification::SyncCompleted), 1);
        wait_until(|| recorder.seen().len() == 1).await;
    }

    #[tokio::test]
    async fn no_notification_processed_after_deactivate() {
        let backend = Arc::new(MockBackend::new());
        let recorder = Arc::new(Recorder::default());
        let mut listeners = lifecycle(backend.clone(), recorder.clone());

        listeners.activate(&[NotificationKind::TxAndBlock]);
        let stale = backend
            .listener(NotificationKind::TxAndBlock, KEY)
            .expect("registered");
        backend.emit(block_attached(1));
        wait_until(|| recorder.seen().len() == 1).await;

        listeners.deactivate();
        assert!(!listeners.is_active());
        assert_eq!(backend.listener_count(NotificationKind::TxAndBlock), 0);
        assert_eq!(backend.emit(block_attached(2)), 0);
        // A racing backend still holding the handle.
        stale.on_notify(block_attached(3));

        listeners.join_retired().await;
        assert_eq!(listeners.live_dispatchers(NotificationKind::TxAndBlock), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(recorder.seen(), vec![block_attached(1)]);

        // Second teardown and second close are no-ops.
        listeners.deactivate();
        stale.close();
        assert_eq!(listeners.registered_kinds(), Vec::new());
    }

    #[tokio::test]
    async fn deactivate_without_activate() {
        let backend = Arc::new(MockBackend::new());
        let mut listeners = lifecycle(backend.clone(), Arc::new(Recorder::default()));
        listeners.deactivate();
        listeners.join_retired().await;
        assert!(!listeners.is_active());
        for kind in NotificationKind::ALL {
            assert_eq!(backend.listener_count(kind), 0);
        }
    }

    #[tokio::test]
    async fn registration_failure_skips_only_that_kind() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_registration(NotificationKind::SyncProgress);
        let recorder = Arc::new(Recorder::default());
        let mut listeners = lifecycle(backend.clone(), recorder.clone());

        listeners.activate(&[
            NotificationKind::SyncProgress,
            NotificationKind::TxAndBlock,
            NotificationKind::BlocksRescan,
        ]);
        assert_eq!(
            listeners.registered_kinds(),
            vec![NotificationKind::TxAndBlock, NotificationKind::BlocksRescan]
        );
        assert!(!listeners.is_registered(NotificationKind::SyncProgress));
        assert_eq!(backend.emit(Notification::SyncCompleted), 0);
        assert_eq!(backend.emit(block_attached(7)), 1);
        wait_until(|| recorder.seen().len() == 1).await;
        assert_eq!(listeners.live_dispatchers(NotificationKind::SyncProgress), 0);
    }

    #[tokio::test]
    async fn dispatch_count_never_exceeds_one() {
        let backend = Arc::new(MockBackend::new());
        let recorder = Arc::new(Recorder::default());
        let mut listeners = lifecycle(backend.clone(), recorder.clone());
        let kind = NotificationKind::TxAndBlock;

        for round in 0..20u32 {
            listeners.activate(&[kind]);
            if round % 3 == 0 {
                listeners.activate(&[kind]);
            }
            backend.emit(block_attached(round));
            if round % 2 == 0 {
                tokio::task::yield_now().await;
            }
            listeners.deactivate();
            if round % 5 == 0 {
                listeners.deactivate();
            }
            assert!(listeners.live_dispatchers(kind) <= 1);
        }
        listeners.activate(&[kind]);
        wait_until(|| listeners.live_dispatchers(kind) == 1).await;
        listeners.deactivate();
        listeners.join_retired().await;

        assert_eq!(listeners.live_dispatchers(kind), 0);
        let peak = listeners.counters[&kind].peak.load(Ordering::SeqCst);
        assert_eq!(peak, 1);
        assert_eq!(backend.registrations(kind), 21);
    }

    #[tokio::test]
    async fn same_kind_notifications_keep_emission_order() {
        let backend = Arc::new(MockBackend::new());
        let recorder = Arc::new(Recorder::default());
        let mut listeners = lifecycle(backend.clone(), recorder.clone());
        listeners.activate(&[NotificationKind::TxAndBlock]);

        for height in 0..5 {
            backend.emit(block_attached(height));
        }
        wait_until(|| recorder.seen().len() == 5).await;
        assert_eq!(
            recorder.seen(),
            (0..5).map(block_attached).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn redraw_requested_when_handler_asks() {
        let backend = Arc::new(MockBackend::new());
        let recorder = Arc::new(Recorder::redraw_on(|n| {
            matches!(n, Notification::SyncCompleted)
        }));
        let redraw = RedrawSignal::new();
        let mut listeners = ListenerLifecycle::new(
            KEY.to_string(),
            backend.clone(),
            recorder.clone(),
            Handle::current(),
            redraw.clone(),
            CancellationToken::new(),
            8,
        );
        listeners.activate(&[NotificationKind::SyncProgress]);
        backend.emit(Notification::PeersChanged { connected: 3 });
        backend.emit(Notification::SyncCompleted);
        wait_until(|| recorder.seen().len() == 2).await;
        assert_eq!(redraw.requested(), 1);
    }

    #[tokio::test]
    async fn parent_cancellation_stops_dispatchers() {
        let backend = Arc::new(MockBackend::new());
        let parent = CancellationToken::new();
        let mut listeners = ListenerLifecycle::new(
            KEY.to_string(),
            backend.clone(),
            Arc::new(Recorder::default()),
            Handle::current(),
            RedrawSignal::new(),
            parent.clone(),
            8,
        );
        listeners.activate(&[NotificationKind::Governance]);
        wait_until(|| listeners.live_dispatchers(NotificationKind::Governance) == 1).await;
        parent.cancel();
        wait_until(|| listeners.live_dispatchers(NotificationKind::Governance) == 0).await;
        // Still registered until the page tears down.
        assert_eq!(backend.listener_count(NotificationKind::Governance), 1);
        drop(listeners);
        assert_eq!(backend.listener_count(NotificationKind::Governance), 0);
    }

    /// Panics on the first notification it is given, records the others.
    #[derive(Default)]
    struct FailsOnce {
        failed: std::sync::atomic::AtomicBool,
        recorder: Recorder,
    }

    impl NotificationHandler for FailsOnce {
        fn on_notification(&self, notification: &Notification) -> bool {
            if !self.failed.swap(true, Ordering::SeqCst) {
                panic!("handler failed on {:?}", notification);
            }
            self.recorder.on_notification(notification)
        }
    }

    #[tokio::test]
    async fn reactivation_after_a_failed_dispatcher() {
        let backend = Arc::new(MockBackend::new());
        let handler = Arc::new(FailsOnce::default());
        let kind = NotificationKind::TxAndBlock;
        let mut listeners = ListenerLifecycle::new(
            KEY.to_string(),
            backend.clone(),
            handler.clone(),
            Handle::current(),
            RedrawSignal::new(),
            CancellationToken::new(),
            8,
        );
        listeners.activate(&[kind]);
        wait_until(|| listeners.live_dispatchers(kind) == 1).await;
        backend.emit(block_attached(1));
        wait_until(|| listeners.live_dispatchers(kind) == 0).await;
        assert!(handler.failed.load(Ordering::SeqCst));

        // The new dispatcher gets the join error of the failed one and runs.
        listeners.deactivate();
        listeners.activate(&[kind]);
        wait_until(|| listeners.live_dispatchers(kind) == 1).await;
        backend.emit(block_attached(2));
        wait_until(|| handler.recorder.seen() == vec![block_attached(2)]).await;

        listeners.deactivate();
        listeners.join_retired().await;
        assert_eq!(listeners.live_dispatchers(kind), 0);
    }

    #[test]
    fn channel_listener_filters_kind_and_closes_once() {
        let (listener, mut receiver) = ChannelListener::new(NotificationKind::Governance, 2);
        listener.on_notify(Notification::SyncCompleted);
        listener.on_notify(Notification::ProposalsSynced);
        assert_eq!(receiver.try_recv().ok(), Some(Notification::ProposalsSynced));
        assert!(receiver.try_recv().is_err());

        // Full channel drops instead of blocking the backend.
        for _ in 0..4 {
            listener.on_notify(Notification::ProposalsSynced);
        }
        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_err());

        listener.close();
        listener.close();
        assert!(listener.is_closed());
        listener.on_notify(Notification::ProposalsSynced);
        assert!(receiver.try_recv().is_err());
    }
}
