use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::{Page, PageContext, Toast};
use crate::backend::{
    model::{
        Notification, NotificationKind, Proposal, ProposalStatus, VoteChoice, VoteDetails,
        WalletId,
    },
    BackendError,
};
use crate::command::{CommandBridge, PendingCommand};
use crate::error::Error;
use crate::fetch::{FetchGuard, FetchState};
use crate::listener::{ListenerLifecycle, NotificationHandler};
use crate::utils::lock;
use crate::vote::VoteAllocator;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProposalState {
    proposal: Proposal,
    proposals_synced: bool,
}

struct GovernanceHandler {
    state: Arc<Mutex<ProposalState>>,
}

impl NotificationHandler for GovernanceHandler {
    fn on_notification(&self, notification: &Notification) -> bool {
        let mut state = lock(&self.state);
        match notification {
            Notification::ProposalsSynced => {
                state.proposals_synced = true;
                true
            }
            Notification::NewProposal(p)
            | Notification::ProposalVoteStarted(p)
            | Notification::ProposalVoteFinished(p) => {
                if p.token != state.proposal.token {
                    return false;
                }
                debug!("Proposal {} is now {:?}", p.token, p.status);
                state.proposal = p.clone();
                true
            }
            _ => false,
        }
    }
}

/// Allocation being edited in the vote modal. The widgets only get a shared
/// reference to the page, the allocator sits behind a mutex.
#[derive(Debug)]
struct VoteModal {
    wallet_id: WalletId,
    allocator: Mutex<VoteAllocator>,
}

/// Details of one proposal and the vote of the selected wallet.
pub struct ProposalPage {
    ctx: PageContext,
    state: Arc<Mutex<ProposalState>>,
    listeners: ListenerLifecycle,
    bridge: CommandBridge,
    selected_wallet: Option<WalletId>,
    details: FetchGuard<VoteDetails>,
    modal: Option<VoteModal>,
    submit: Option<PendingCommand<usize>>,
}

impl ProposalPage {
    pub fn new(ctx: PageContext, proposal: Proposal) -> Self {
        let state = Arc::new(Mutex::new(ProposalState {
            proposal,
            proposals_synced: false,
        }));
        let handler = Arc::new(GovernanceHandler {
            state: state.clone(),
        });
        let listeners = ctx.listeners(ctx.page_key("proposal"), handler);
        let details = FetchGuard::new(
            "vote details",
            ctx.runtime.clone(),
            ctx.shutdown.clone(),
            ctx.redraw.clone(),
        );
        let bridge = ctx.bridge();
        Self {
            ctx,
            state,
            listeners,
            bridge,
            selected_wallet: None,
            details,
            modal: None,
            submit: None,
        }
    }

    pub fn proposal(&self) -> Proposal {
        lock(&self.state).proposal.clone()
    }

    pub fn proposals_synced(&self) -> bool {
        lock(&self.state).proposals_synced
    }

    pub fn selected_wallet(&self) -> Option<WalletId> {
        self.selected_wallet
    }

    /// Select the wallet voting on the proposal. Replaces any lookup still
    /// running for a previous selection.
    pub fn select_wallet(&mut self, wallet_id: WalletId) {
        self.selected_wallet = Some(wallet_id);
        self.modal = None;
        self.fetch_details(wallet_id);
    }

    fn fetch_details(&self, wallet_id: WalletId) {
        let backend = self.ctx.backend.clone();
        let token = self.proposal().token;
        self.details.start(move |_| async move {
            backend.fetch_vote_details(wallet_id, &token).await
        });
    }

    pub fn details_state(&self) -> FetchState {
        self.details.state()
    }

    pub fn vote_details(&self) -> Option<Result<VoteDetails, BackendError>> {
        self.details.result()
    }

    /// Open the vote modal with every eligible ticket of the selected wallet.
    pub fn open_vote_modal(&mut self) -> Result<(), Error> {
        let wallet_id = self.selected_wallet.ok_or(Error::NoWalletSelected)?;
        if self.proposal().status != ProposalStatus::Voting {
            return Err(Error::NoVoteInProgress);
        }
        let details = match self.details.result() {
            Some(Ok(details)) => details,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(Error::VoteDetailsUnavailable),
        };
        self.modal = Some(VoteModal {
            wallet_id,
            allocator: Mutex::new(VoteAllocator::new(details.eligible_tickets)),
        });
        Ok(())
    }

    pub fn close_vote_modal(&mut self) {
        self.modal = None;
    }

    pub fn is_voting(&self) -> bool {
        self.modal.is_some()
    }

    fn with_allocator<T>(
        &self,
        f: impl FnOnce(&mut VoteAllocator) -> T,
    ) -> Result<T, Error> {
        let modal = self.modal.as_ref().ok_or(Error::NoVoteInProgress)?;
        let mut allocator = lock(&modal.allocator);
        Ok(f(&mut allocator))
    }

    pub fn increment(&self, choice: VoteChoice) -> Result<(), Error> {
        self.with_allocator(|a| a.increment(choice))?
            .map_err(Error::from)
    }

    pub fn decrement(&self, choice: VoteChoice) -> Result<(), Error> {
        self.with_allocator(|a| a.decrement(choice))?
            .map_err(Error::from)
    }

    pub fn set_max(&self, choice: VoteChoice) -> Result<(), Error> {
        self.with_allocator(|a| a.set_max(choice))
    }

    pub fn set_vote_input(&self, choice: VoteChoice, input: &str) -> Result<(), Error> {
        self.with_allocator(|a| a.set_from_input(choice, input))
    }

    /// Yes count, no count and tickets left to allocate.
    pub fn allocation(&self) -> Option<(usize, usize, usize)> {
        self.with_allocator(|a| {
            (
                a.count(VoteChoice::Yes),
                a.count(VoteChoice::No),
                a.remaining(),
            )
        })
        .ok()
    }

    pub fn can_submit(&self) -> bool {
        self.submit.is_none()
            && self
                .with_allocator(|a| a.total() > 0 && !a.is_over_allocated())
                .unwrap_or(false)
    }

    /// Commit the allocation and cast the votes. The modal stays open until
    /// the backend answered.
    pub fn submit(&mut self, passphrase: &str) -> Result<(), Error> {
        if let Some(pending) = &self.submit {
            return Err(Error::Busy(pending.label()));
        }
        let modal = self.modal.as_ref().ok_or(Error::NoVoteInProgress)?;
        let allocation = lock(&modal.allocator).clone().commit()?;
        let votes = allocation.votes();
        let count = votes.len();
        info!(
            "Casting {} yes and {} no votes on {}",
            allocation.yes.len(),
            allocation.no.len(),
            self.proposal().token
        );

        let backend = self.ctx.backend.clone();
        let wallet_id = modal.wallet_id;
        let token = self.proposal().token;
        let passphrase = passphrase.to_string();
        self.submit = Some(self.bridge.run("vote submission", async move {
            backend
                .cast_votes(wallet_id, &token, votes, &passphrase)
                .await
                .map(|()| count)
        }));
        Ok(())
    }
}

impl Page for ProposalPage {
    fn id(&self) -> &'static str {
        "proposal"
    }

    fn on_navigated_to(&mut self) {
        self.listeners.activate(&[NotificationKind::Governance]);
        if let Some(wallet_id) = self.selected_wallet {
            self.fetch_details(wallet_id);
        }
    }

    fn handle_frame(&mut self) -> Vec<Toast> {
        let res = match self.submit.as_mut().and_then(|cmd| cmd.try_recv()) {
            Some(res) => res,
            None => return Vec::new(),
        };
        self.submit = None;
        match res {
            Ok(count) => {
                self.modal = None;
                // A hidden page fetches again when it is shown.
                let active = self.listeners.is_active();
                if let Some(wallet_id) = self.selected_wallet.filter(|_| active) {
                    self.fetch_details(wallet_id);
                }
                vec![Toast::Success(format!("{} votes cast", count))]
            }
            Err(e) => vec![e.into()],
        }
    }

    fn on_navigated_from(&mut self) {
        self.listeners.deactivate();
        self.details.cancel();
        self.modal = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{mock_proposal, mock_tickets, MockBackend, MOCK_PROPOSAL_TOKEN};
    use crate::config::Config;
    use crate::testutils::wait_until;
    use crate::vote::VoteError;
    use std::time::Duration;
    use tokio::runtime::Handle;

    fn page(backend: Arc<MockBackend>) -> ProposalPage {
        ProposalPage::new(
            PageContext::new(backend, Handle::current(), Config::default()),
            mock_proposal(),
        )
    }

    fn voted_proposal() -> Proposal {
        Proposal {
            status: ProposalStatus::Approved,
            ..mock_proposal()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn latest_wallet_selection_wins() {
        let backend = Arc::new(MockBackend::new());
        backend.set_fetch_delay(1, Duration::from_millis(50));
        backend.set_fetch_delay(2, Duration::from_millis(10));
        let mut page = page(backend);
        page.on_navigated_to();

        page.select_wallet(1);
        page.select_wallet(2);
        assert_eq!(page.open_vote_modal(), Err(Error::VoteDetailsUnavailable));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(page.details_state(), FetchState::Delivered);
        let details = page.vote_details().unwrap().unwrap();
        assert_eq!(details.eligible_tickets, mock_tickets(2, 3));

        page.open_vote_modal().unwrap();
        page.set_max(VoteChoice::Yes).unwrap();
        assert_eq!(page.allocation(), Some((3, 0, 0)));

        page.set_vote_input(VoteChoice::No, &usize::MAX.to_string())
            .unwrap();
        assert_eq!(page.allocation(), Some((3, usize::MAX, 0)));
        assert!(!page.can_submit());
        assert_eq!(
            page.submit("wallet-2"),
            Err(Error::Vote(VoteError::OverAllocated {
                requested: usize::MAX,
                eligible: 3
            }))
        );
    }

    #[tokio::test]
    async fn vote_flow() {
        let backend = Arc::new(MockBackend::new());
        let mut page = page(backend.clone());
        page.on_navigated_to();
        assert_eq!(page.open_vote_modal(), Err(Error::NoWalletSelected));
        assert_eq!(page.increment(VoteChoice::Yes), Err(Error::NoVoteInProgress));

        page.select_wallet(1);
        wait_until(|| page.details_state() == FetchState::Delivered).await;
        page.open_vote_modal().unwrap();
        assert!(!page.can_submit());
        assert_eq!(
            page.submit("wallet-1"),
            Err(Error::Vote(VoteError::NoVotes))
        );

        page.increment(VoteChoice::Yes).unwrap();
        page.increment(VoteChoice::Yes).unwrap();
        page.set_max(VoteChoice::No).unwrap();
        assert_eq!(page.allocation(), Some((2, 3, 0)));
        assert_eq!(
            page.increment(VoteChoice::No),
            Err(Error::Vote(VoteError::NoRemainingVotes))
        );
        page.decrement(VoteChoice::No).unwrap();
        assert!(page.can_submit());

        // Wrong passphrase: the error is shown and the modal stays open.
        page.submit("wrong").unwrap();
        assert_eq!(page.submit("wrong"), Err(Error::Busy("vote submission")));
        let mut toasts = Vec::new();
        wait_until(|| {
            toasts.extend(page.handle_frame());
            !toasts.is_empty()
        })
        .await;
        assert_eq!(
            toasts,
            vec![Toast::Error(BackendError::InvalidPassphrase.to_string())]
        );
        assert!(page.is_voting());

        page.submit("wallet-1").unwrap();
        let mut toasts = Vec::new();
        wait_until(|| {
            toasts.extend(page.handle_frame());
            !toasts.is_empty()
        })
        .await;
        assert_eq!(toasts, vec![Toast::Success("4 votes cast".to_string())]);
        assert!(!page.is_voting());

        let log = backend.cast_votes_log();
        assert_eq!(log.len(), 1);
        let (wallet_id, token, votes) = &log[0];
        assert_eq!((*wallet_id, token.as_str()), (1, MOCK_PROPOSAL_TOKEN));
        let tickets = mock_tickets(1, 5);
        let yes: Vec<_> = votes
            .iter()
            .filter(|v| v.choice == VoteChoice::Yes)
            .map(|v| v.ticket.clone())
            .collect();
        assert_eq!(yes, tickets[0..2].to_vec());

        // Details are fetched again after the vote.
        wait_until(|| {
            page.vote_details()
                .and_then(|d| d.ok())
                .map(|d| d.eligible_tickets.len())
                == Some(1)
        })
        .await;
        assert_eq!(
            page.vote_details().unwrap().unwrap().cast_count(VoteChoice::No),
            2
        );
    }

    #[tokio::test]
    async fn vote_cast_while_hidden_refetches_on_return() {
        let backend = Arc::new(MockBackend::new());
        let mut page = page(backend.clone());
        page.on_navigated_to();
        page.select_wallet(1);
        wait_until(|| page.details_state() == FetchState::Delivered).await;
        page.open_vote_modal().unwrap();
        page.increment(VoteChoice::Yes).unwrap();
        page.submit("wallet-1").unwrap();

        page.on_navigated_from();
        let generation = page.details.generation();
        let mut toasts = Vec::new();
        wait_until(|| {
            toasts.extend(page.handle_frame());
            !toasts.is_empty()
        })
        .await;
        assert_eq!(toasts, vec![Toast::Success("1 votes cast".to_string())]);
        // Nothing fetched while hidden, the details are those before the vote.
        assert_eq!(page.details.generation(), generation);
        assert_eq!(page.details_state(), FetchState::Delivered);
        let details = page.vote_details().unwrap().unwrap();
        assert_eq!(details.eligible_tickets.len(), 5);

        page.on_navigated_to();
        wait_until(|| page.details_state() == FetchState::Delivered).await;
        assert_eq!(page.details.generation(), generation + 1);
        let details = page.vote_details().unwrap().unwrap();
        assert_eq!(details.eligible_tickets.len(), 4);
        assert_eq!(details.cast_count(VoteChoice::Yes), 1);
        page.on_navigated_from();
    }

    #[tokio::test]
    async fn governance_notifications() {
        let backend = Arc::new(MockBackend::new());
        let mut page = page(backend.clone());
        page.on_navigated_to();
        page.select_wallet(2);
        wait_until(|| page.details_state() == FetchState::Delivered).await;

        backend.emit(Notification::ProposalVoteFinished(Proposal {
            token: "other".to_string(),
            ..voted_proposal()
        }));
        backend.emit(Notification::ProposalsSynced);
        wait_until(|| page.proposals_synced()).await;
        assert_eq!(page.proposal().status, ProposalStatus::Voting);

        backend.emit(Notification::ProposalVoteFinished(voted_proposal()));
        wait_until(|| page.proposal().status == ProposalStatus::Approved).await;
        assert_eq!(page.open_vote_modal(), Err(Error::NoVoteInProgress));

        page.on_navigated_from();
        assert_eq!(backend.listener_count(NotificationKind::Governance), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_the_page_drops_pending_lookup() {
        let backend = Arc::new(MockBackend::new());
        backend.set_fetch_delay(1, Duration::from_millis(20));
        let mut page = page(backend);
        page.on_navigated_to();
        page.select_wallet(1);
        page.on_navigated_from();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(page.details_state(), FetchState::Superseded);
        assert_eq!(page.vote_details(), None);

        // Coming back fetches again for the same wallet.
        page.on_navigated_to();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(page.details_state(), FetchState::Delivered);
        assert_eq!(page.selected_wallet(), Some(1));
    }
}
