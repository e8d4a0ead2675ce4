use std::fmt;

pub type WalletId = u32;

/// Category of backend event. The backend exposes one registration pair per
/// kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NotificationKind {
    SyncProgress,
    TxAndBlock,
    BlocksRescan,
    Governance,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::SyncProgress,
        NotificationKind::TxAndBlock,
        NotificationKind::BlocksRescan,
        NotificationKind::Governance,
    ];
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SyncProgress => write!(f, "sync progress"),
            Self::TxAndBlock => write!(f, "tx and block"),
            Self::BlocksRescan => write!(f, "blocks rescan"),
            Self::Governance => write!(f, "governance"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    CFilters,
    Headers,
    AddressDiscovery,
    HeadersRescan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncProgress {
    pub stage: SyncStage,
    /// Overall progress, between 0 and 100.
    pub total_progress: u8,
    pub headers_fetched: u32,
    pub best_block_height: u32,
    pub time_remaining_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RescanProgress {
    pub wallet_id: WalletId,
    pub current_height: u32,
    pub total_headers: u32,
    /// Between 0 and 100.
    pub progress: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub wallet_id: WalletId,
    pub hash: String,
    pub amount: i64,
    /// None if unconfirmed.
    pub block_height: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    Discussion,
    Voting,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub token: String,
    pub name: String,
    pub status: ProposalStatus,
}

/// Typed event emitted by the backend onto a listener.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    SyncStarted { restarted: bool },
    PeersChanged { connected: u32 },
    SyncProgress(SyncProgress),
    SyncCompleted,
    SyncCanceled { will_restart: bool },
    SyncEndedWithError(String),
    NewTransaction(Transaction),
    BlockAttached { wallet_id: WalletId, height: u32 },
    TransactionConfirmed {
        wallet_id: WalletId,
        hash: String,
        height: u32,
    },
    RescanStarted { wallet_id: WalletId },
    RescanProgress(RescanProgress),
    RescanEnded {
        wallet_id: WalletId,
        error: Option<String>,
    },
    ProposalsSynced,
    NewProposal(Proposal),
    ProposalVoteStarted(Proposal),
    ProposalVoteFinished(Proposal),
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::SyncStarted { .. }
            | Self::PeersChanged { .. }
            | Self::SyncProgress(_)
            | Self::SyncCompleted
            | Self::SyncCanceled { .. }
            | Self::SyncEndedWithError(_) => NotificationKind::SyncProgress,
            Self::NewTransaction(_)
            | Self::BlockAttached { .. }
            | Self::TransactionConfirmed { .. } => NotificationKind::TxAndBlock,
            Self::RescanStarted { .. } | Self::RescanProgress(_) | Self::RescanEnded { .. } => {
                NotificationKind::BlocksRescan
            }
            Self::ProposalsSynced
            | Self::NewProposal(_)
            | Self::ProposalVoteStarted(_)
            | Self::ProposalVoteFinished(_) => NotificationKind::Governance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteChoice {
    Yes,
    No,
}

impl VoteChoice {
    pub fn other(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }

    /// Vote option id as understood by the governance backend.
    pub fn id(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EligibleTicket {
    pub hash: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalVote {
    pub ticket: EligibleTicket,
    pub choice: VoteChoice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteDetails {
    pub eligible_tickets: Vec<EligibleTicket>,
    /// Votes already cast by this wallet on the proposal.
    pub votes: Vec<ProposalVote>,
}

impl VoteDetails {
    pub fn cast_count(&self, choice: VoteChoice) -> usize {
        self.votes.iter().filter(|v| v.choice == choice).count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DexStatus {
    pub initialized: bool,
    pub logged_in: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    /// Hosts of the exchanges the client is already registered with.
    pub exchanges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    pub host: String,
    /// Registration fee, in atoms.
    pub fee: u64,
    pub fee_asset: String,
    pub markets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterForm {
    pub address: String,
    pub cert: Option<Vec<u8>>,
    pub app_password: String,
    /// Fee the user accepted, checked by the backend against the exchange fee.
    pub fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterResult {
    pub fee_coin_id: String,
    pub required_confirmations: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWalletForm {
    pub asset: String,
    pub account: String,
    pub wallet_password: String,
    pub app_password: String,
}
