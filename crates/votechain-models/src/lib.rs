pub mod candidate;
pub mod poll;
pub mod role;
pub mod user;
pub mod vote;

pub use candidate::{Candidate, CandidateIndex, ChainCandidateId, VotingStatus};
pub use poll::{NewPoll, Poll, PollStatus};
pub use role::Role;
pub use user::AuthUser;
pub use vote::VoteRecord;

use thiserror::Error;

/// Returned when a stored enum value does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}
