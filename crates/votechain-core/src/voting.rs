use crate::{RetryPolicy, VoteError};
use votechain_chain::{ChainSession, TxReceipt, WalletProvider};
use votechain_models::{AuthUser, CandidateIndex, Poll, VoteRecord};
use votechain_store::DocumentStore;

/// What a signed-in user sees on the voting screen.
#[derive(Debug, Clone)]
pub struct Ballot {
    pub poll: Option<Poll>,
    pub has_voted: bool,
}

#[derive(Debug, Clone)]
pub struct CastVote {
    pub receipt: TxReceipt,
    pub record: VoteRecord,
}

/// Coordinates the document store and the contract for ballots and votes.
pub struct VotingService<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: DocumentStore> VotingService<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn has_recorded_vote(&self, poll_id: &str, user_id: &str) -> Result<bool, VoteError> {
        let votes = self
            .retry
            .run("load votes", || self.store.get_user_votes(user_id))
            .await?;
        Ok(votes.iter().any(|v| v.poll_id == poll_id))
    }

    pub async fn ballot(&self, user: &AuthUser) -> Result<Ballot, VoteError> {
        let poll = self
            .retry
            .run("load active poll", || self.store.get_active_poll())
            .await?;
        let has_voted = match &poll {
            Some(poll) => self.has_recorded_vote(&poll.id, &user.uid).await?,
            None => false,
        };
        Ok(Ballot { poll, has_voted })
    }

    /// Cast `user`'s vote for the candidate at `candidate` in poll `poll_id`.
    ///
    /// The poll must be active and the index in range. A vote already on
    /// record for this user, or already counted by the contract for the
    /// connected account, is rejected before any transaction is sent. The
    /// transaction itself is never retried.
    pub async fn cast_vote<P: WalletProvider>(
        &self,
        session: &ChainSession<P>,
        poll_id: &str,
        user: &AuthUser,
        candidate: CandidateIndex,
    ) -> Result<CastVote, VoteError> {
        let poll = self
            .retry
            .run("load poll", || self.store.get_poll(poll_id))
            .await?
            .ok_or_else(|| VoteError::NotFound(format!("poll {poll_id}")))?;
        if !poll.is_active() {
            return Err(VoteError::BadRequest(format!(
                "poll '{}' is {}, not active",
                poll.title, poll.status
            )));
        }
        let Some(name) = poll.candidate_name(candidate) else {
            return Err(VoteError::BadRequest(format!(
                "poll '{}' has no candidate #{}",
                poll.title,
                candidate.as_usize() + 1
            )));
        };

        if self.has_recorded_vote(&poll.id, &user.uid).await? {
            return Err(VoteError::AlreadyVoted);
        }
        let account = session.account();
        if self
            .retry
            .run("check voter", || session.has_voted(account))
            .await?
        {
            tracing::info!(account, poll = %poll.id, "contract already counted this account");
            return Err(VoteError::AlreadyVoted);
        }

        let receipt = session.submit_vote(candidate).await?;
        let record = self
            .retry
            .run("record vote", || {
                self.store
                    .record_vote(&poll.id, &user.uid, candidate, account)
            })
            .await
            .inspect_err(|e| {
                tracing::error!(tx = %receipt.hash, poll = %poll.id, "vote confirmed on-chain but not recorded: {e}");
            })?;
        tracing::info!(poll = %poll.id, user = %user.uid, candidate = name, "vote recorded");
        Ok(CastVote { receipt, record })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{poll_with_status, session, test_store, user, TestWallet, ACCOUNT};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use votechain_models::PollStatus;
    use votechain_store::SqlStore;

    fn service(store: SqlStore) -> VotingService<SqlStore> {
        VotingService::new(store, RetryPolicy::none())
    }

    #[tokio::test]
    async fn vote_is_sent_on_chain_and_recorded_zero_based() {
        let store = test_store().await;
        let poll = poll_with_status(&store, "Budget", &["A", "B", "C"], PollStatus::Active).await;
        let wallet = Arc::new(TestWallet::new());
        let session = session(wallet.clone()).await;
        let voting = service(store);
        let alice = user("alice", "alice@example.com");

        let cast = voting
            .cast_vote(&session, &poll.id, &alice, CandidateIndex(2))
            .await
            .expect("vote");

        assert_eq!(cast.record.candidate_index, CandidateIndex(2));
        assert_eq!(cast.record.wallet_address, ACCOUNT);
        assert_eq!(cast.receipt.block_number, Some(42));
        assert_eq!(wallet.sent_transactions(), 1);

        let ballot = voting.ballot(&alice).await.expect("ballot");
        assert!(ballot.has_voted);
        assert_eq!(ballot.poll.map(|p| p.id), Some(poll.id));
    }

    #[tokio::test]
    async fn recorded_vote_is_rejected_without_touching_the_chain() {
        let store = test_store().await;
        let poll = poll_with_status(&store, "Budget", &["A", "B"], PollStatus::Active).await;
        store
            .record_vote(&poll.id, "alice", CandidateIndex(0), ACCOUNT)
            .await
            .expect("prior vote");
        let wallet = Arc::new(TestWallet::new());
        let session = session(wallet.clone()).await;
        let connect_calls = wallet.calls().len();

        let err = service(store)
            .cast_vote(&session, &poll.id, &user("alice", "a@x.io"), CandidateIndex(1))
            .await
            .expect_err("duplicate");

        assert!(matches!(err, VoteError::AlreadyVoted));
        assert_eq!(wallet.calls().len(), connect_calls);
    }

    #[tokio::test]
    async fn contract_voter_flag_blocks_a_second_transaction() {
        let store = test_store().await;
        let poll = poll_with_status(&store, "Budget", &["A", "B"], PollStatus::Active).await;
        let wallet = Arc::new(TestWallet::new());
        wallet.voted.store(true, Ordering::SeqCst);
        let session = session(wallet.clone()).await;
        let voting = service(store);

        let err = voting
            .cast_vote(&session, &poll.id, &user("bob", "b@x.io"), CandidateIndex(0))
            .await
            .expect_err("already voted on-chain");

        assert!(matches!(err, VoteError::AlreadyVoted));
        assert_eq!(wallet.sent_transactions(), 0);
        assert!(voting.store().get_poll_votes(&poll.id).await.expect("votes").is_empty());
    }

    #[tokio::test]
    async fn inactive_poll_and_bad_index_are_bad_requests() {
        let store = test_store().await;
        let draft = poll_with_status(&store, "Later", &["A"], PollStatus::Draft).await;
        let live = poll_with_status(&store, "Now", &["A"], PollStatus::Active).await;
        let wallet = Arc::new(TestWallet::new());
        let session = session(wallet.clone()).await;
        let voting = service(store);
        let carol = user("carol", "c@x.io");

        let not_active = voting
            .cast_vote(&session, &draft.id, &carol, CandidateIndex(0))
            .await
            .expect_err("draft");
        let out_of_range = voting
            .cast_vote(&session, &live.id, &carol, CandidateIndex(1))
            .await
            .expect_err("index");
        let missing = voting
            .cast_vote(&session, "nope", &carol, CandidateIndex(0))
            .await
            .expect_err("missing");

        assert!(matches!(not_active, VoteError::BadRequest(_)));
        assert!(matches!(out_of_range, VoteError::BadRequest(_)));
        assert!(matches!(missing, VoteError::NotFound(_)));
        assert_eq!(wallet.sent_transactions(), 0);
    }

    #[tokio::test]
    async fn ballot_without_active_poll() {
        let voting = service(test_store().await);
        let ballot = voting.ballot(&user("dan", "d@x.io")).await.expect("ballot");
        assert!(ballot.poll.is_none());
        assert!(!ballot.has_voted);
    }
}
