use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    model::{
        DexStatus, EligibleTicket, ExchangeConfig, LoginResult, NewWalletForm, Notification,
        NotificationKind, Proposal, ProposalStatus, ProposalVote, RegisterForm, RegisterResult,
        SyncProgress, SyncStage, VoteDetails, WalletId,
    },
    Backend, BackendError,
};
use crate::listener::Listener;
use crate::utils::lock;

pub const MOCK_PROPOSAL_TOKEN: &str = "a3def199af812b79";
pub const MOCK_EXCHANGE_HOST: &str = "dex.decred.org:7232";

#[derive(Debug, Default)]
struct MockDex {
    app_password: Option<String>,
    logged_in: bool,
    exchanges: BTreeMap<String, ExchangeConfig>,
    registered: BTreeSet<String>,
    wallets: BTreeSet<String>,
}

/// In-memory backend used by the simulator and the tests.
///
/// Listeners are kept per `(kind, key)` and duplicate registrations are
/// rejected. Every async call can be slowed down to exercise out of order
/// completions.
#[derive(Debug)]
pub struct MockBackend {
    listeners: Mutex<BTreeMap<(NotificationKind, String), Arc<dyn Listener>>>,
    registrations: Mutex<BTreeMap<NotificationKind, usize>>,
    failing_kinds: Mutex<BTreeSet<NotificationKind>>,
    sync_status: Mutex<Option<SyncProgress>>,
    passphrases: Mutex<HashMap<WalletId, String>>,
    vote_details: Mutex<HashMap<(WalletId, String), VoteDetails>>,
    fetch_delays: Mutex<HashMap<WalletId, Duration>>,
    cast_votes: Mutex<Vec<(WalletId, String, Vec<ProposalVote>)>>,
    call_delay: Mutex<Duration>,
    dex: Mutex<MockDex>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        let backend = Self {
            listeners: Mutex::new(BTreeMap::new()),
            registrations: Mutex::new(BTreeMap::new()),
            failing_kinds: Mutex::new(BTreeSet::new()),
            sync_status: Mutex::new(None),
            passphrases: Mutex::new(HashMap::new()),
            vote_details: Mutex::new(HashMap::new()),
            fetch_delays: Mutex::new(HashMap::new()),
            cast_votes: Mutex::new(Vec::new()),
            call_delay: Mutex::new(Duration::ZERO),
            dex: Mutex::new(MockDex::default()),
        };
        backend.init_test_data();
        backend
    }

    fn init_test_data(&self) {
        // Two wallets with tickets eligible to vote on the same proposal.
        for (wallet_id, tickets) in [(1, 5), (2, 3)] {
            lock(&self.passphrases).insert(wallet_id, format!("wallet-{}", wallet_id));
            self.set_vote_details(
                wallet_id,
                MOCK_PROPOSAL_TOKEN,
                VoteDetails {
                    eligible_tickets: mock_tickets(wallet_id, tickets),
                    votes: Vec::new(),
                },
            );
        }

        lock(&self.dex).exchanges.insert(
            MOCK_EXCHANGE_HOST.to_string(),
            ExchangeConfig {
                host: MOCK_EXCHANGE_HOST.to_string(),
                fee: 100_000_000,
                fee_asset: "dcr".to_string(),
                markets: vec!["dcr_btc".to_string(), "dcr_ltc".to_string()],
            },
        );

        *lock(&self.sync_status) = Some(SyncProgress {
            stage: SyncStage::Headers,
            total_progress: 0,
            headers_fetched: 0,
            best_block_height: 0,
            time_remaining_secs: 0,
        });
    }

    pub fn set_vote_details(&self, wallet_id: WalletId, proposal_token: &str, details: VoteDetails) {
        lock(&self.vote_details).insert((wallet_id, proposal_token.to_string()), details);
    }

    /// Delay every vote details lookup of this wallet.
    pub fn set_fetch_delay(&self, wallet_id: WalletId, delay: Duration) {
        lock(&self.fetch_delays).insert(wallet_id, delay);
    }

    /// Delay every other async call.
    pub fn set_call_delay(&self, delay: Duration) {
        *lock(&self.call_delay) = delay;
    }

    pub fn set_sync_status(&self, status: SyncProgress) {
        *lock(&self.sync_status) = Some(status);
    }

    /// Make every future registration of this kind fail.
    pub fn fail_registration(&self, kind: NotificationKind) {
        lock(&self.failing_kinds).insert(kind);
    }

    /// Total number of successful registrations of this kind.
    pub fn registrations(&self, kind: NotificationKind) -> usize {
        lock(&self.registrations).get(&kind).copied().unwrap_or(0)
    }

    /// Number of currently registered listeners of this kind.
    pub fn listener_count(&self, kind: NotificationKind) -> usize {
        lock(&self.listeners)
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn listener(&self, kind: NotificationKind, key: &str) -> Option<Arc<dyn Listener>> {
        lock(&self.listeners)
            .get(&(kind, key.to_string()))
            .cloned()
    }

    /// Votes received through `cast_votes`, in call order.
    pub fn cast_votes_log(&self) -> Vec<(WalletId, String, Vec<ProposalVote>)> {
        lock(&self.cast_votes).clone()
    }

    /// Push a notification to every listener registered for its kind and
    /// return how many listeners were notified.
    pub fn emit(&self, notification: Notification) -> usize {
        let kind = notification.kind();
        // Listeners are called outside of the lock, they may call back into us.
        let listeners: Vec<Arc<dyn Listener>> = lock(&self.listeners)
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, l)| l.clone())
            .collect();
        for listener in &listeners {
            listener.on_notify(notification.clone());
        }
        listeners.len()
    }

    async fn delay(&self) {
        let delay = *lock(&self.call_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_app_password(&self, password: &str) -> Result<(), BackendError> {
        match &lock(&self.dex).app_password {
            None => Err(BackendError::NotInitialized),
            Some(p) if p == password => Ok(()),
            Some(_) => Err(BackendError::InvalidPassphrase),
        }
    }

    fn check_passphrase(&self, wallet_id: WalletId, passphrase: &str) -> Result<(), BackendError> {
        match lock(&self.passphrases).get(&wallet_id) {
            None => Err(BackendError::NotFound(format!("wallet {}", wallet_id))),
            Some(p) if p == passphrase => Ok(()),
            Some(_) => Err(BackendError::InvalidPassphrase),
        }
    }
}

pub fn mock_proposal() -> Proposal {
    Proposal {
        token: MOCK_PROPOSAL_TOKEN.to_string(),
        name: "Treasury spending for DEX marketing".to_string(),
        status: ProposalStatus::Voting,
    }
}

/// Deterministic tickets for a wallet, front of the pool first.
pub fn mock_tickets(wallet_id: WalletId, count: usize) -> Vec<EligibleTicket> {
    (0..count)
        .map(|i| EligibleTicket {
            hash: format!("{:02x}{:062x}", wallet_id, i),
            address: format!("DsWallet{}Ticket{}", wallet_id, i),
        })
        .collect()
}

#[async_trait]
impl Backend for MockBackend {
    fn add_listener(
        &self,
        kind: NotificationKind,
        key: &str,
        listener: Arc<dyn Listener>,
    ) -> Result<(), BackendError> {
        if lock(&self.failing_kinds).contains(&kind) {
            return Err(BackendError::Registration(format!(
                "{} notifications are unavailable",
                kind
            )));
        }
        let mut listeners = lock(&self.listeners);
        let id = (kind, key.to_string());
        if listeners.contains_key(&id) {
            return Err(BackendError::ListenerExists(kind, key.to_string()));
        }
        listeners.insert(id, listener);
        *lock(&self.registrations).entry(kind).or_insert(0) += 1;
        Ok(())
    }

    fn remove_listener(&self, kind: NotificationKind, key: &str) {
        lock(&self.listeners).remove(&(kind, key.to_string()));
    }

    async fn sync_status(&self) -> Result<SyncProgress, BackendError> {
        self.delay().await;
        lock(&self.sync_status).clone().ok_or(BackendError::NoAnswer)
    }

    async fn unlock_wallet(
        &self,
        wallet_id: WalletId,
        passphrase: &str,
    ) -> Result<(), BackendError> {
        self.delay().await;
        self.check_passphrase(wallet_id, passphrase)
    }

    async fn fetch_vote_details(
        &self,
        wallet_id: WalletId,
        proposal_token: &str,
    ) -> Result<VoteDetails, BackendError> {
        let delay = lock(&self.fetch_delays).get(&wallet_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.vote_details)
            .get(&(wallet_id, proposal_token.to_string()))
            .cloned()
            .ok_or_else(|| {
                BackendError::NotFound(format!(
                    "proposal {} for wallet {}",
                    proposal_token, wallet_id
                ))
            })
    }

    async fn cast_votes(
        &self,
        wallet_id: WalletId,
        proposal_token: &str,
        votes: Vec<ProposalVote>,
        passphrase: &str,
    ) -> Result<(), BackendError> {
        self.delay().await;
        self.check_passphrase(wallet_id, passphrase)?;
        let mut details = lock(&self.vote_details);
        let entry = details
            .get_mut(&(wallet_id, proposal_token.to_string()))
            .ok_or_else(|| BackendError::NotFound(format!("proposal {}", proposal_token)))?;
        for vote in &votes {
            if !entry.eligible_tickets.contains(&vote.ticket) {
                return Err(BackendError::Rpc(
                    -1,
                    format!("ticket {} is not eligible", vote.ticket.hash),
                ));
            }
        }
        entry
            .eligible_tickets
            .retain(|t| !votes.iter().any(|v| &v.ticket == t));
        entry.votes.extend(votes.iter().cloned());
        lock(&self.cast_votes).push((wallet_id, proposal_token.to_string(), votes));
        Ok(())
    }

    async fn dex_status(&self) -> Result<DexStatus, BackendError> {
        self.delay().await;
        let dex = lock(&self.dex);
        Ok(DexStatus {
            initialized: dex.app_password.is_some(),
            logged_in: dex.logged_in,
        })
    }

    async fn initialize_client(&self, password: &str) -> Result<(), BackendError> {
        self.delay().await;
        let mut dex = lock(&self.dex);
        if dex.app_password.is_some() {
            return Err(BackendError::Unexpected(
                "client is already initialized".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(BackendError::Rpc(-1, "empty password".to_string()));
        }
        dex.app_password = Some(password.to_string());
        dex.logged_in = true;
        Ok(())
    }

    async fn login(&self, password: &str) -> Result<LoginResult, BackendError> {
        self.delay().await;
        self.check_app_password(password)?;
        let mut dex = lock(&self.dex);
        dex.logged_in = true;
        Ok(LoginResult {
            exchanges: dex.registered.iter().cloned().collect(),
        })
    }

    async fn register(&self, form: &RegisterForm) -> Result<RegisterResult, BackendError> {
        self.delay().await;
        self.check_app_password(&form.app_password)?;
        let mut dex = lock(&self.dex);
        let config = dex
            .exchanges
            .get(&form.address)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(form.address.clone()))?;
        if config.fee != form.fee {
            return Err(BackendError::Rpc(
                -2,
                format!("fee mismatch: expected {}, got {}", config.fee, form.fee),
            ));
        }
        if !dex.wallets.contains(&config.fee_asset) {
            return Err(BackendError::Rpc(
                -3,
                format!("no {} wallet to pay the fee", config.fee_asset),
            ));
        }
        if !dex.registered.insert(form.address.clone()) {
            return Err(BackendError::Rpc(-4, "already registered".to_string()));
        }
        Ok(RegisterResult {
            fee_coin_id: format!("{}:0", form.address),
            required_confirmations: 1,
        })
    }

    async fn create_wallet(&self, form: &NewWalletForm) -> Result<(), BackendError> {
        self.delay().await;
        self.check_app_password(&form.app_password)?;
        if !lock(&self.dex).wallets.insert(form.asset.clone()) {
            return Err(BackendError::Rpc(
                -5,
                format!("{} wallet already exists", form.asset),
            ));
        }
        Ok(())
    }

    async fn fetch_remote_config(
        &self,
        address: &str,
        _cert: Option<&[u8]>,
    ) -> Result<ExchangeConfig, BackendError> {
        self.delay().await;
        lock(&self.dex)
            .exchanges
            .get(address)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(address.to_string()))
    }
}
