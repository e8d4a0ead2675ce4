use thiserror::Error;
use tracing::error;

use crate::backend::model::{EligibleTicket, ProposalVote, VoteChoice};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("All eligible votes are already allocated")]
    NoRemainingVotes,
    #[error("No {0} vote to remove")]
    NothingToRemove(VoteChoice),
    #[error("No vote allocated")]
    NoVotes,
    #[error("{requested} votes allocated but only {eligible} tickets are eligible")]
    OverAllocated { requested: usize, eligible: usize },
}

/// Distributes the eligible tickets of a wallet between yes and no.
///
/// The buttons of the vote modal only go through `increment`, `decrement` and
/// `set_max`, which keep `yes + no <= eligible`. Typed input can exceed it and
/// is rejected on commit.
#[derive(Debug, Clone)]
pub struct VoteAllocator {
    pool: Vec<EligibleTicket>,
    yes: usize,
    no: usize,
}

impl VoteAllocator {
    pub fn new(pool: Vec<EligibleTicket>) -> Self {
        Self { pool, yes: 0, no: 0 }
    }

    pub fn eligible(&self) -> usize {
        self.pool.len()
    }

    pub fn count(&self, choice: VoteChoice) -> usize {
        match choice {
            VoteChoice::Yes => self.yes,
            VoteChoice::No => self.no,
        }
    }

    fn count_mut(&mut self, choice: VoteChoice) -> &mut usize {
        match choice {
            VoteChoice::Yes => &mut self.yes,
            VoteChoice::No => &mut self.no,
        }
    }

    /// Saturates, a typed count can be any `usize`.
    pub fn total(&self) -> usize {
        self.yes.saturating_add(self.no)
    }

    pub fn remaining(&self) -> usize {
        self.eligible().saturating_sub(self.total())
    }

    pub fn is_over_allocated(&self) -> bool {
        self.total() > self.eligible()
    }

    pub fn increment(&mut self, choice: VoteChoice) -> Result<(), VoteError> {
        if self.total() >= self.eligible() {
            return Err(VoteError::NoRemainingVotes);
        }
        *self.count_mut(choice) += 1;
        Ok(())
    }

    pub fn decrement(&mut self, choice: VoteChoice) -> Result<(), VoteError> {
        let count = self.count_mut(choice);
        if *count == 0 {
            return Err(VoteError::NothingToRemove(choice));
        }
        *count -= 1;
        Ok(())
    }

    /// Give every ticket not allocated to the other choice to `choice`.
    pub fn set_max(&mut self, choice: VoteChoice) {
        let max = self.eligible().saturating_sub(self.count(choice.other()));
        *self.count_mut(choice) = max;
    }

    /// Set a count from the text typed in the vote modal. Anything that is not
    /// a base-10 number counts as 0.
    pub fn set_from_input(&mut self, choice: VoteChoice, input: &str) {
        *self.count_mut(choice) = input.trim().parse().unwrap_or(0);
    }

    /// Assign the front `yes` tickets of the pool to yes and the next `no`
    /// ones to no.
    pub fn commit(self) -> Result<VoteAllocation, VoteError> {
        let requested = match self.yes.checked_add(self.no) {
            Some(0) => return Err(VoteError::NoVotes),
            Some(requested) => requested,
            None => usize::MAX,
        };
        if requested > self.eligible() {
            error!(
                "Refusing to commit {} yes and {} no votes out of {} eligible tickets",
                self.yes,
                self.no,
                self.eligible()
            );
            return Err(VoteError::OverAllocated {
                requested,
                eligible: self.eligible(),
            });
        }

        let mut pool = self.pool.into_iter();
        let yes: Vec<_> = pool.by_ref().take(self.yes).collect();
        let no: Vec<_> = pool.take(self.no).collect();
        Ok(VoteAllocation { yes, no })
    }
}

/// Tickets assigned to each choice by a commit. No ticket is in both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteAllocation {
    pub yes: Vec<EligibleTicket>,
    pub no: Vec<EligibleTicket>,
}

impl VoteAllocation {
    pub fn len(&self) -> usize {
        self.yes.len() + self.no.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn votes(&self) -> Vec<ProposalVote> {
        self.yes
            .iter()
            .map(|t| (t, VoteChoice::Yes))
            .chain(self.no.iter().map(|t| (t, VoteChoice::No)))
            .map(|(ticket, choice)| ProposalVote {
                ticket: ticket.clone(),
                choice,
            })
            .collect()
    }
}
