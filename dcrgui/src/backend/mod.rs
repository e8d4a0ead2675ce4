pub mod mock;
pub mod model;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::listener::Listener;
use model::{
    DexStatus, ExchangeConfig, LoginResult, NewWalletForm, NotificationKind, ProposalVote,
    RegisterForm, RegisterResult, SyncProgress, VoteDetails, WalletId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Something was wrong with the request.
    Rpc(i32, String),
    /// Something unexpected happened.
    Unexpected(String),
    /// No response.
    NoAnswer,
    /// Wrong wallet passphrase or app password.
    InvalidPassphrase,
    /// Requested wallet, proposal or exchange is unknown to the backend.
    NotFound(String),
    /// A listener is already registered under this key for this kind.
    ListenerExists(NotificationKind, String),
    /// The listener could not be registered.
    Registration(String),
    /// The DEX client was not initialized.
    NotInitialized,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Rpc(code, e) => write!(f, "Backend error rpc call: [{:?}] {}", code, e),
            Self::Unexpected(e) => write!(f, "Backend unexpected error: {}", e),
            Self::NoAnswer => write!(f, "Backend returned no answer"),
            Self::InvalidPassphrase => write!(f, "Invalid passphrase"),
            Self::NotFound(e) => write!(f, "Not found: {}", e),
            Self::ListenerExists(kind, key) => {
                write!(f, "A {} listener already exists for key {}", kind, key)
            }
            Self::Registration(e) => write!(f, "Failed to register listener: {}", e),
            Self::NotInitialized => write!(f, "Client is not initialized"),
        }
    }
}

impl std::error::Error for BackendError {}

/// The wallet and DEX libraries the UI drives. Registration calls are cheap and
/// synchronous, every other call may block on network or disk and is only ever
/// awaited from a background task.
#[async_trait]
pub trait Backend: Debug + Send + Sync {
    fn add_listener(
        &self,
        kind: NotificationKind,
        key: &str,
        listener: Arc<dyn Listener>,
    ) -> Result<(), BackendError>;
    fn remove_listener(&self, kind: NotificationKind, key: &str);

    async fn sync_status(&self) -> Result<SyncProgress, BackendError>;
    async fn unlock_wallet(&self, wallet_id: WalletId, passphrase: &str)
        -> Result<(), BackendError>;
    async fn fetch_vote_details(
        &self,
        wallet_id: WalletId,
        proposal_token: &str,
    ) -> Result<VoteDetails, BackendError>;
    async fn cast_votes(
        &self,
        wallet_id: WalletId,
        proposal_token: &str,
        votes: Vec<ProposalVote>,
        passphrase: &str,
    ) -> Result<(), BackendError>;

    async fn dex_status(&self) -> Result<DexStatus, BackendError>;
    async fn initialize_client(&self, password: &str) -> Result<(), BackendError>;
    async fn login(&self, password: &str) -> Result<LoginResult, BackendError>;
    async fn register(&self, form: &RegisterForm) -> Result<RegisterResult, BackendError>;
    async fn create_wallet(&self, form: &NewWalletForm) -> Result<(), BackendError>;
    async fn fetch_remote_config(
        &self,
        address: &str,
        cert: Option<&[u8]>,
    ) -> Result<ExchangeConfig, BackendError>;
}
