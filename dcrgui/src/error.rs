use thiserror::Error;

use crate::{backend::BackendError, config::ConfigError, vote::VoteError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Backend errors are shown to the user as they are.
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0} stopped before delivering its result")]
    CommandAborted(&'static str),
    #[error("{0} result was already delivered")]
    AlreadyDelivered(&'static str),
    #[error("Please wait, {0} is in progress")]
    Busy(&'static str),
    #[error("Vote details are not available yet")]
    VoteDetailsUnavailable,
    #[error("No wallet selected")]
    NoWalletSelected,
    #[error("No vote in progress")]
    NoVoteInProgress,
    #[error("No exchange selected")]
    NoExchangeSelected,
}
