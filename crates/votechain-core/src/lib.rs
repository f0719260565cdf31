pub mod admin;
pub mod error;
pub mod prefs;
pub mod retry;
pub mod roles;
pub mod tally;
pub mod voting;

pub use admin::PollDraft;
pub use error::VoteError;
pub use prefs::{Preferences, Theme};
pub use retry::{RetryPolicy, Retryable};
pub use roles::{resolve_auth_state, resolve_role};
pub use tally::{
    admin_stats, confidence, poll_results, poll_tally, tally_votes, AdminStats, PollResult,
    PollTally,
};
pub use voting::{Ballot, CastVote, VotingService};

#[cfg(test)]
pub(crate) mod testing;
