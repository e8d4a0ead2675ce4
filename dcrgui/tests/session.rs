use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use dcrgui::{
    backend::{
        mock::{mock_proposal, MockBackend, MOCK_PROPOSAL_TOKEN},
        model::{Notification, NotificationKind, Transaction, VoteChoice},
        Backend,
    },
    config::Config,
    fetch::FetchState,
    page::{OverviewPage, Page, PageContext, ProposalPage, Toast},
};

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

fn context(backend: Arc<MockBackend>) -> PageContext {
    PageContext::new(backend, Handle::current(), Config::default())
}

fn new_tx(hash: &str) -> Notification {
    Notification::NewTransaction(Transaction {
        wallet_id: 1,
        hash: hash.to_string(),
        amount: 42,
        block_height: None,
    })
}

#[tokio::test]
async fn page_switching() {
    let backend = Arc::new(MockBackend::new());
    let ctx = context(backend.clone());
    let mut overview = OverviewPage::new(ctx.clone());
    let mut proposal = ProposalPage::new(ctx.clone(), mock_proposal());

    for i in 0..5 {
        overview.on_navigated_to();
        assert_eq!(backend.listener_count(NotificationKind::TxAndBlock), 1);
        backend.emit(new_tx(&i.to_string()));
        wait_until(|| overview.state().recent_transactions.len() == i + 1).await;
        overview.on_navigated_from();

        proposal.on_navigated_to();
        assert_eq!(backend.listener_count(NotificationKind::TxAndBlock), 0);
        assert_eq!(backend.listener_count(NotificationKind::Governance), 1);
        // Nobody listens to transactions on this page.
        assert_eq!(backend.emit(new_tx("ignored")), 0);
        proposal.on_navigated_from();
    }

    assert_eq!(backend.registrations(NotificationKind::TxAndBlock), 5);
    assert_eq!(backend.registrations(NotificationKind::Governance), 5);
    for kind in NotificationKind::ALL {
        assert_eq!(backend.listener_count(kind), 0);
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    let hashes: Vec<_> = overview
        .state()
        .recent_transactions
        .iter()
        .map(|t| t.hash.clone())
        .collect();
    assert_eq!(hashes, vec!["4", "3", "2", "1", "0"]);
}

#[tokio::test]
async fn shutdown_stops_notification_processing() {
    let backend = Arc::new(MockBackend::new());
    let ctx = context(backend.clone());
    let mut overview = OverviewPage::new(ctx.clone());
    overview.on_navigated_to();
    backend.emit(Notification::PeersChanged { connected: 2 });
    wait_until(|| overview.state().connected_peers == 2).await;

    ctx.shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(10)).await;
    backend.emit(Notification::PeersChanged { connected: 8 });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(overview.state().connected_peers, 2);

    overview.on_navigated_from();
    assert_eq!(backend.listener_count(NotificationKind::SyncProgress), 0);
}

#[tokio::test]
async fn vote_with_every_ticket() {
    let backend = Arc::new(MockBackend::new());
    backend.set_fetch_delay(1, Duration::from_millis(40));
    let ctx = context(backend.clone());
    let mut proposal = ProposalPage::new(ctx.clone(), mock_proposal());
    proposal.on_navigated_to();

    proposal.select_wallet(1);
    proposal.select_wallet(2);
    wait_until(|| proposal.details_state() == FetchState::Delivered).await;
    proposal.open_vote_modal().unwrap();
    proposal.set_vote_input(VoteChoice::Yes, "2").unwrap();
    proposal.set_max(VoteChoice::No).unwrap();
    assert_eq!(proposal.allocation(), Some((2, 1, 0)));
    proposal.submit("wallet-2").unwrap();

    let mut toasts = Vec::new();
    wait_until(|| {
        toasts.extend(proposal.handle_frame());
        !toasts.is_empty()
    })
    .await;
    assert_eq!(toasts, vec![Toast::Success("3 votes cast".to_string())]);

    let details = backend
        .fetch_vote_details(2, MOCK_PROPOSAL_TOKEN)
        .await
        .unwrap();
    assert!(details.eligible_tickets.is_empty());
    assert_eq!(details.cast_count(VoteChoice::Yes), 2);
    assert_eq!(details.cast_count(VoteChoice::No), 1);
    // Wallet 1 was never used.
    assert!(backend.cast_votes_log().iter().all(|(w, _, _)| *w == 2));
    proposal.on_navigated_from();
}
