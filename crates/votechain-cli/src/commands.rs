use crate::cli::{ChainCommand, Command, PollCommand, PrefsCommand};
use crate::config::Config;
use anyhow::{Context, Result};
use chrono::Utc;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use votechain_auth::{parse_redirect, AuthGateway, AuthState, GoogleOAuth, SessionFile};
use votechain_chain::{connect, ChainSession, ContractArtifact, RpcWallet};
use votechain_core::{admin, tally, PollDraft, Preferences, VoteError, VotingService};
use votechain_models::{AuthUser, CandidateIndex, Poll};
use votechain_store::{create_store, DocumentStore, Store};

pub async fn run(command: Command, config: Config) -> Result<()> {
    let oauth = GoogleOAuth::new(config.oauth_config()).map_err(VoteError::from)?;
    let auth = AuthGateway::new(oauth, Some(SessionFile::new(config.session_path())));
    let user = auth.restore().await.map_err(VoteError::from)?;

    match command {
        Command::Login => login(&auth, &config).await,
        Command::Logout => {
            auth.logout().await.map_err(VoteError::from)?;
            println!("Signed out.");
            Ok(())
        }
        Command::Prefs { command } => prefs(command, &config).await,
        Command::Polls {
            command: PollCommand::Drafts,
        } => list_drafts(&config).await,
        Command::Whoami => {
            let (_, state) = open(&config, user).await?;
            whoami(&state);
            Ok(())
        }
        Command::Polls { command } => {
            let (store, state) = open(&config, user).await?;
            polls(command, &config, &store, &state).await
        }
        Command::Ballot => {
            let (store, state) = open(&config, user).await?;
            ballot(&config, &store, &state).await
        }
        Command::Vote { candidate, poll } => {
            let (store, state) = open(&config, user).await?;
            vote(&config, &store, &state, poll, candidate).await
        }
        Command::Results { poll } => {
            let (store, _) = open(&config, user).await?;
            results(&config, &store, poll).await
        }
        Command::Stats => {
            let (store, state) = open(&config, user).await?;
            stats(&store, &state).await
        }
        Command::Chain { command } => {
            let (_, state) = open(&config, user).await?;
            chain(command, &config, &state).await
        }
        Command::Role { user_id, role } => {
            let (store, state) = open(&config, user).await?;
            admin::assign_role(&store, &state, &user_id, role).await?;
            println!("{user_id} is now {role}.");
            Ok(())
        }
    }
}

/// Open the document store and resolve the signed-in user's role against it.
async fn open(config: &Config, user: Option<AuthUser>) -> Result<(Store, AuthState)> {
    let store = open_store(config, user.as_ref()).await?;
    let state = votechain_core::resolve_auth_state(&store, user, &config.allow_list())
        .await
        .map_err(VoteError::from)?;
    Ok((store, state))
}

async fn open_store(config: &Config, user: Option<&AuthUser>) -> Result<Store> {
    let store = create_store(
        &config.store.backend,
        &config.store.database_url,
        config.store.max_connections,
        config.firestore_config().as_ref(),
    )
    .await
    .map_err(VoteError::from)?;
    Ok(match (store, user) {
        (Store::Firestore(remote), Some(user)) => {
            Store::Firestore(remote.with_id_token(user.id_token.clone()))
        }
        (store, _) => store,
    })
}

fn signed_in(state: &AuthState) -> Result<&AuthUser, VoteError> {
    state
        .user()
        .ok_or_else(|| VoteError::AuthFailed("not signed in; run `votechain login`".into()))
}

async fn contract_address(config: &Config) -> Result<String, VoteError> {
    if let Some(address) = &config.chain.contract_address {
        return Ok(address.clone());
    }
    match &config.chain.artifact_path {
        Some(path) => Ok(ContractArtifact::load(path).await?.address),
        None => Err(VoteError::ContractCallFailed(
            "contract address not configured; set [chain] contract_address".into(),
        )),
    }
}

async fn open_session(config: &Config) -> Result<ChainSession<RpcWallet>, VoteError> {
    let address = contract_address(config).await?;
    let wallet = RpcWallet::new(config.chain.rpc_url.clone())
        .map_err(|e| VoteError::WalletAbsent(e.to_string()))?;
    Ok(connect(wallet, &config.chain_config(address)).await?)
}

async fn login(auth: &AuthGateway, config: &Config) -> Result<()> {
    let pending = auth.login_with_google().map_err(VoteError::from)?;
    println!("Open this URL in your browser to sign in:\n\n  {}\n", pending.auth_url);
    print!("Paste the address you were redirected to: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading redirect address")?;
    let (state, code) = parse_redirect(&line).map_err(VoteError::from)?;
    let user = auth
        .complete_login(&pending, &state, &code)
        .await
        .map_err(VoteError::from)?;

    let store = open_store(config, Some(&user)).await?;
    let role = votechain_core::resolve_role(&store, &user, &config.allow_list())
        .await
        .map_err(VoteError::from)?;
    println!("Signed in as {} ({role}).", display_name(&user));
    Ok(())
}

fn display_name(user: &AuthUser) -> &str {
    user.display_name
        .as_deref()
        .or(user.email.as_deref())
        .unwrap_or(user.uid.as_str())
}

fn whoami(state: &AuthState) {
    match state.user() {
        None => println!("Not signed in."),
        Some(user) => {
            let role = state.role().map(|r| r.to_string()).unwrap_or_else(|| "unassigned".into());
            println!("{} <{}>", display_name(user), user.email.as_deref().unwrap_or("-"));
            println!("uid:  {}", user.uid);
            println!("role: {role}");
        }
    }
}

fn print_poll(poll: &Poll) {
    println!(
        "{}  [{}]  {}  ({} candidates, {} to {})",
        poll.id,
        poll.status,
        poll.title,
        poll.candidates.len(),
        poll.start_date.format("%Y-%m-%d %H:%M"),
        poll.end_date.format("%Y-%m-%d %H:%M"),
    );
}

async fn polls(command: PollCommand, config: &Config, store: &Store, state: &AuthState) -> Result<()> {
    match command {
        PollCommand::List => {
            let polls = config
                .retry_policy()
                .run("load polls", || store.get_polls())
                .await
                .map_err(VoteError::from)?;
            if polls.is_empty() {
                println!("No polls yet.");
            }
            for poll in &polls {
                print_poll(poll);
            }
        }
        PollCommand::Create {
            title,
            description,
            candidates,
            starts,
            ends,
            save_draft,
        } => {
            let draft = PollDraft {
                title,
                description,
                candidates,
                start_date: starts.unwrap_or_else(Utc::now),
                end_date: ends,
            };
            if save_draft {
                let path = config.prefs_path();
                let mut prefs = Preferences::load(&path).await?;
                prefs.draft_polls.push(draft);
                prefs.save(&path).await?;
                println!("Draft saved ({} total).", prefs.draft_polls.len());
            } else {
                let poll = admin::create_poll(store, state, draft).await?;
                println!("Created poll:");
                print_poll(&poll);
            }
        }
        PollCommand::Drafts => list_drafts(config).await?,
        PollCommand::Publish { index } => {
            let path = config.prefs_path();
            let mut prefs = Preferences::load(&path).await?;
            let draft = prefs
                .take_draft(index)
                .ok_or_else(|| VoteError::NotFound(format!("draft #{index}")))?;
            let poll = admin::create_poll(store, state, draft).await?;
            prefs.save(&path).await?;
            println!("Published draft #{index}:");
            print_poll(&poll);
        }
        PollCommand::Activate { id } => {
            let poll = admin::activate_poll(store, state, &id).await?;
            println!("Active poll:");
            print_poll(&poll);
        }
        PollCommand::End { id } => {
            let poll = admin::end_poll(store, state, &id).await?;
            print_poll(&poll);
        }
    }
    Ok(())
}

async fn list_drafts(config: &Config) -> Result<()> {
    let prefs = Preferences::load(&config.prefs_path()).await?;
    if prefs.draft_polls.is_empty() {
        println!("No saved drafts.");
    }
    for (i, draft) in prefs.draft_polls.iter().enumerate() {
        println!(
            "#{i}  {}  ({} candidates, ends {})",
            draft.title,
            draft.candidates.len(),
            draft.end_date.format("%Y-%m-%d")
        );
    }
    Ok(())
}

async fn ballot(config: &Config, store: &Store, state: &AuthState) -> Result<()> {
    let user = signed_in(state)?;
    let voting = VotingService::new(store.clone(), config.retry_policy());
    let ballot = voting.ballot(user).await?;
    let Some(poll) = ballot.poll else {
        println!("There is no active poll right now.");
        return Ok(());
    };
    print_poll(&poll);
    if !poll.description.is_empty() {
        println!("{}", poll.description);
    }
    for (i, name) in poll.candidates.iter().enumerate() {
        println!("  {}. {name}", i + 1);
    }
    if ballot.has_voted {
        println!("You have already voted in this poll.");
    } else {
        println!("Vote with `votechain vote <number>`.");
    }
    Ok(())
}

async fn vote(
    config: &Config,
    store: &Store,
    state: &AuthState,
    poll_id: Option<String>,
    candidate: u32,
) -> Result<()> {
    let user = signed_in(state)?;
    let index = candidate
        .checked_sub(1)
        .map(CandidateIndex)
        .ok_or_else(|| VoteError::BadRequest("candidates are numbered from 1".into()))?;
    let poll_id = match poll_id {
        Some(id) => id,
        None => store
            .get_active_poll()
            .await
            .map_err(VoteError::from)?
            .map(|p| p.id)
            .ok_or_else(|| VoteError::NotFound("active poll".into()))?,
    };

    let session = open_session(config).await?;
    let voting = VotingService::new(store.clone(), config.retry_policy());
    let cast = voting.cast_vote(&session, &poll_id, user, index).await?;
    println!("Vote recorded for candidate {candidate}.");
    println!("Transaction: {}", cast.receipt.hash);
    if let Some(block) = cast.receipt.block_number {
        println!("Block:       {block}");
    }
    Ok(())
}

fn print_tally(poll: &Poll, tally: &tally::PollTally) {
    println!("{} ({} votes)", poll.title, tally.total_votes);
    for line in tally.to_string().lines() {
        println!("  {line}");
    }
    if tally.discarded > 0 {
        println!("  ({} votes for unknown candidates ignored)", tally.discarded);
    }
}

async fn results(config: &Config, store: &Store, poll_id: Option<String>) -> Result<()> {
    let retry = config.retry_policy();
    if let Some(id) = poll_id {
        let poll = store
            .get_poll(&id)
            .await
            .map_err(VoteError::from)?
            .ok_or_else(|| VoteError::NotFound(format!("poll {id}")))?;
        let tally = retry
            .run("tally poll", || tally::poll_tally(store, &poll))
            .await
            .map_err(VoteError::from)?;
        print_tally(&poll, &tally);
        return Ok(());
    }

    let results = retry
        .run("load results", || votechain_core::poll_results(store))
        .await
        .map_err(VoteError::from)?;
    if results.is_empty() {
        println!("No ended polls yet.");
    }
    for result in &results {
        print_tally(&result.poll, &result.tally);
    }
    Ok(())
}

async fn stats(store: &Store, state: &AuthState) -> Result<()> {
    admin::require_admin(state)?;
    let polls = store.get_polls().await.map_err(VoteError::from)?;
    let stats = votechain_core::admin_stats(store, &polls)
        .await
        .map_err(VoteError::from)?;
    println!("Total votes: {}", stats.total_votes);
    println!("Candidates:");
    for total in &stats.candidates {
        println!("  {:>5}  {}", total.votes, total.name);
    }
    println!("Recent polls:");
    for poll in &stats.recent {
        println!("  {}  {} ({} candidates)", poll.id, poll.title, poll.candidate_count);
    }
    Ok(())
}

async fn chain(command: ChainCommand, config: &Config, state: &AuthState) -> Result<()> {
    let session = open_session(config).await?;
    match command {
        ChainCommand::Status => {
            let status = session.get_voting_status().await.map_err(VoteError::from)?;
            let owner = session.owner().await.map_err(VoteError::from)?;
            println!("Contract:   {}", session.contract_address());
            println!("Account:    {}", session.account());
            println!("Owner:      {owner}");
            println!("Voting:     {}", if status.active { "open" } else { "closed" });
            println!("Candidates: {}", status.candidate_count);
            println!("Votes:      {}", status.total_votes);
        }
        ChainCommand::Candidates => {
            let candidates = session.get_candidates().await.map_err(VoteError::from)?;
            let confidence = votechain_core::confidence(&candidates);
            for (candidate, pct) in candidates.iter().zip(confidence) {
                println!(
                    "  #{}  {}  {} votes  (confidence {pct}%)",
                    candidate.id, candidate.name, candidate.vote_count
                );
            }
        }
        ChainCommand::AddCandidate { name } => {
            let receipt = admin::add_candidate(&session, state, &name).await?;
            println!("Candidate added in {}.", receipt.hash);
        }
        ChainCommand::Start => {
            let receipt = admin::start_voting(&session, state).await?;
            println!("Voting opened in {}.", receipt.hash);
        }
        ChainCommand::End => {
            let receipt = admin::end_voting(&session, state).await?;
            println!("Voting closed in {}.", receipt.hash);
        }
    }
    Ok(())
}

async fn prefs(command: PrefsCommand, config: &Config) -> Result<()> {
    let path = config.prefs_path();
    let mut prefs = Preferences::load(&path).await?;
    match command {
        PrefsCommand::Show => {
            println!("theme:  {}", prefs.theme);
            println!("drafts: {}", prefs.draft_polls.len());
        }
        PrefsCommand::Theme { theme } => {
            prefs.theme = theme.unwrap_or_else(|| prefs.theme.toggled());
            prefs.save(&path).await?;
            println!("Theme set to {}.", prefs.theme);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(display_name: Option<&str>, email: Option<&str>) -> AuthUser {
        AuthUser {
            uid: "uid-1".into(),
            display_name: display_name.map(str::to_string),
            email: email.map(str::to_string),
            id_token: "token".into(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn display_name_falls_back_to_email_then_uid() {
        assert_eq!(display_name(&user(Some("Ada"), Some("ada@x.io"))), "Ada");
        assert_eq!(display_name(&user(None, Some("ada@x.io"))), "ada@x.io");
        assert_eq!(display_name(&user(None, None)), "uid-1");
    }

    #[test]
    fn signed_in_requires_a_user() {
        let err = signed_in(&AuthState::Anonymous).expect_err("anonymous");
        assert_eq!(err.error_code(), "AUTH_FAILED");

        let state = AuthState::new(Some(user(None, None)));
        assert_eq!(signed_in(&state).expect("signed in").uid, "uid-1");
    }

    #[tokio::test]
    async fn contract_address_prefers_configured_value() {
        let mut config = Config::default();
        config.chain.contract_address = Some("0xabc".into());
        assert_eq!(contract_address(&config).await.expect("address"), "0xabc");

        config.chain.contract_address = None;
        config.chain.artifact_path = None;
        let err = contract_address(&config).await.expect_err("unconfigured");
        assert_eq!(err.error_code(), "CONTRACT_CALL_FAILED");
    }
}
