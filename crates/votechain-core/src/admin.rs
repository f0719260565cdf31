//! Poll administration and the contract owner's actions. Everything here
//! requires the admin role.

use crate::VoteError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use votechain_auth::AuthState;
use votechain_chain::{ChainSession, TxReceipt, WalletProvider};
use votechain_models::{AuthUser, NewPoll, Poll, PollStatus, Role};
use votechain_store::DocumentStore;

/// Poll form as entered by an admin, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub candidates: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl PollDraft {
    /// Trims fields and drops blank candidates.
    pub fn validate(self, created_by: &str) -> Result<NewPoll, VoteError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(VoteError::BadRequest("poll title is required".into()));
        }
        let candidates: Vec<String> = self
            .candidates
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if candidates.is_empty() {
            return Err(VoteError::BadRequest(
                "a poll needs at least one candidate".into(),
            ));
        }
        if self.end_date <= self.start_date {
            return Err(VoteError::BadRequest(
                "poll end date must be after its start date".into(),
            ));
        }
        Ok(NewPoll {
            title,
            description: self.description.trim().to_string(),
            candidates,
            start_date: self.start_date,
            end_date: self.end_date,
            created_by: created_by.to_string(),
        })
    }
}

pub fn require_admin(state: &AuthState) -> Result<&AuthUser, VoteError> {
    match state {
        AuthState::AuthenticatedAdmin(user) => Ok(user),
        AuthState::Anonymous => Err(VoteError::Forbidden("sign in first".into())),
        AuthState::AuthenticatedUnassigned(_) | AuthState::AuthenticatedUser(_) => {
            Err(VoteError::Forbidden("admin role required".into()))
        }
    }
}

pub async fn create_poll<S: DocumentStore>(
    store: &S,
    state: &AuthState,
    draft: PollDraft,
) -> Result<Poll, VoteError> {
    let admin = require_admin(state)?;
    let poll = draft.validate(&admin.uid)?;
    Ok(store.create_poll(&poll).await?)
}

/// Makes the poll the active one; any previously active poll is ended.
pub async fn activate_poll<S: DocumentStore>(
    store: &S,
    state: &AuthState,
    poll_id: &str,
) -> Result<Poll, VoteError> {
    require_admin(state)?;
    Ok(store.update_poll_status(poll_id, PollStatus::Active).await?)
}

pub async fn end_poll<S: DocumentStore>(
    store: &S,
    state: &AuthState,
    poll_id: &str,
) -> Result<Poll, VoteError> {
    require_admin(state)?;
    Ok(store.update_poll_status(poll_id, PollStatus::Ended).await?)
}

pub async fn assign_role<S: DocumentStore>(
    store: &S,
    state: &AuthState,
    user_id: &str,
    role: Role,
) -> Result<(), VoteError> {
    let admin = require_admin(state)?;
    if admin.uid == user_id && role != Role::Admin {
        return Err(VoteError::BadRequest("admins cannot demote themselves".into()));
    }
    Ok(store.set_user_role(user_id, role).await?)
}

/// The connected account must own the contract (addresses compare
/// case-insensitively).
pub async fn ensure_contract_owner<P: WalletProvider>(
    session: &ChainSession<P>,
    state: &AuthState,
) -> Result<(), VoteError> {
    require_admin(state)?;
    let owner = session.owner().await?;
    if !owner.eq_ignore_ascii_case(session.account()) {
        return Err(VoteError::Forbidden(format!(
            "account {} is not the contract owner ({owner})",
            session.account()
        )));
    }
    Ok(())
}

pub async fn add_candidate<P: WalletProvider>(
    session: &ChainSession<P>,
    state: &AuthState,
    name: &str,
) -> Result<TxReceipt, VoteError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(VoteError::BadRequest("candidate name is required".into()));
    }
    ensure_contract_owner(session, state).await?;
    Ok(session.add_candidate(name).await?)
}

pub async fn start_voting<P: WalletProvider>(
    session: &ChainSession<P>,
    state: &AuthState,
) -> Result<TxReceipt, VoteError> {
    ensure_contract_owner(session, state).await?;
    Ok(session.start_voting().await?)
}

pub async fn end_voting<P: WalletProvider>(
    session: &ChainSession<P>,
    state: &AuthState,
) -> Result<TxReceipt, VoteError> {
    ensure_contract_owner(session, state).await?;
    Ok(session.end_voting().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{session, test_store, user, TestWallet, ACCOUNT};
    use chrono::Duration;
    use std::sync::Arc;

    fn admin() -> AuthState {
        AuthState::new(Some(user("root", "root@example.com"))).with_role(Role::Admin)
    }

    fn draft(candidates: &[&str]) -> PollDraft {
        let start = Utc::now();
        PollDraft {
            title: "  Treasurer  ".into(),
            description: String::new(),
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            start_date: start,
            end_date: start + Duration::days(3),
        }
    }

    #[test]
    fn validation_trims_and_drops_blank_candidates() {
        let poll = draft(&["Ada", "  ", "", " Bob "])
            .validate("root")
            .expect("valid");
        assert_eq!(poll.title, "Treasurer");
        assert_eq!(poll.candidates, vec!["Ada", "Bob"]);
        assert_eq!(poll.created_by, "root");
    }

    #[test]
    fn validation_rejects_incomplete_forms() {
        assert!(draft(&["", " "]).validate("root").is_err());

        let mut untitled = draft(&["Ada"]);
        untitled.title = "   ".into();
        assert!(untitled.validate("root").is_err());

        let mut backwards = draft(&["Ada"]);
        backwards.end_date = backwards.start_date - Duration::hours(1);
        assert!(matches!(
            backwards.validate("root"),
            Err(VoteError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn only_admins_manage_polls() {
        let store = test_store().await;
        let member = AuthState::new(Some(user("m", "m@example.com"))).with_role(Role::User);

        let denied = create_poll(&store, &member, draft(&["Ada"])).await;
        assert!(matches!(denied, Err(VoteError::Forbidden(_))));
        let anonymous = create_poll(&store, &AuthState::Anonymous, draft(&["Ada"])).await;
        assert!(matches!(anonymous, Err(VoteError::Forbidden(_))));

        let poll = create_poll(&store, &admin(), draft(&["Ada"])).await.expect("create");
        assert_eq!(poll.created_by, "root");
        assert!(matches!(
            activate_poll(&store, &member, &poll.id).await,
            Err(VoteError::Forbidden(_))
        ));

        let active = activate_poll(&store, &admin(), &poll.id).await.expect("activate");
        assert!(active.is_active());
        let ended = end_poll(&store, &admin(), &poll.id).await.expect("end");
        assert_eq!(ended.status, PollStatus::Ended);
    }

    #[tokio::test]
    async fn activating_unknown_poll_is_not_found() {
        let store = test_store().await;
        let err = activate_poll(&store, &admin(), "ghost").await.expect_err("ghost");
        assert!(matches!(err, VoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn role_assignment() {
        let store = test_store().await;
        assign_role(&store, &admin(), "m", Role::Admin).await.expect("promote");
        assert_eq!(store.get_user_role("m").await.expect("role"), Role::Admin);

        let demote_self = assign_role(&store, &admin(), "root", Role::User).await;
        assert!(matches!(demote_self, Err(VoteError::BadRequest(_))));
    }

    #[tokio::test]
    async fn owner_actions_require_the_owner_account() {
        let wallet = Arc::new(TestWallet::with_owner("0x70997970c51812dc3a010c7d01b50e0d17dc79c8"));
        let session = session(wallet.clone()).await;

        let err = start_voting(&session, &admin()).await.expect_err("not owner");
        assert!(matches!(err, VoteError::Forbidden(_)));
        assert_eq!(wallet.sent_transactions(), 0);
    }

    #[tokio::test]
    async fn owner_comparison_ignores_case() {
        let wallet = Arc::new(TestWallet::with_owner(&ACCOUNT.to_ascii_uppercase().replace("0X", "0x")));
        let session = session(wallet.clone()).await;

        add_candidate(&session, &admin(), " Ada ").await.expect("add");
        end_voting(&session, &admin()).await.expect("end");
        assert_eq!(wallet.sent_transactions(), 2);

        let blank = add_candidate(&session, &admin(), "  ").await;
        assert!(matches!(blank, Err(VoteError::BadRequest(_))));
    }
}
