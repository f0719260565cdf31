//! Vote counting for results, analytics and the admin dashboard.

use serde::Serialize;
use std::fmt;
use votechain_models::{Candidate, Poll, PollStatus, VoteRecord};
use votechain_store::{DocumentStore, StoreError};

const RECENT_POLLS: usize = 6;

/// Per-candidate share of the leading candidate's votes, as a rounded
/// integer percent. The leader is always 100 unless nobody has votes.
pub fn confidence(candidates: &[Candidate]) -> Vec<u32> {
    let max = candidates
        .iter()
        .map(|c| c.vote_count)
        .max()
        .unwrap_or(0)
        .max(1) as u128;
    candidates
        .iter()
        .map(|c| {
            // Round half up: (2 * v * 100 + max) / (2 * max).
            let votes = c.vote_count as u128;
            ((votes * 200 + max) / (max * 2)) as u32
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateTally {
    pub name: String,
    pub votes: u64,
    pub percentage: f64,
}

impl fmt::Display for CandidateTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = if self.votes == 1 { "vote" } else { "votes" };
        write!(
            f,
            "{}: {} {unit} ({:.1}%)",
            self.name, self.votes, self.percentage
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollTally {
    pub candidates: Vec<CandidateTally>,
    pub total_votes: u64,
    /// Records whose index has no candidate in the poll.
    pub discarded: u64,
}

impl fmt::Display for PollTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, candidate) in self.candidates.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{candidate}")?;
        }
        Ok(())
    }
}

pub fn tally_votes(candidate_names: &[String], records: &[VoteRecord]) -> PollTally {
    let mut counts = vec![0u64; candidate_names.len()];
    let mut discarded = 0;
    for record in records {
        match counts.get_mut(record.candidate_index.as_usize()) {
            Some(count) => *count += 1,
            None => discarded += 1,
        }
    }
    if discarded > 0 {
        tracing::debug!(discarded, "skipped votes for unknown candidates");
    }

    let total_votes: u64 = counts.iter().sum();
    let candidates = candidate_names
        .iter()
        .zip(counts)
        .map(|(name, votes)| CandidateTally {
            name: name.clone(),
            votes,
            percentage: if total_votes == 0 {
                0.0
            } else {
                votes as f64 / total_votes as f64 * 100.0
            },
        })
        .collect();

    PollTally {
        candidates,
        total_votes,
        discarded,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PollResult {
    pub poll: Poll,
    pub tally: PollTally,
}

pub async fn poll_tally<S: DocumentStore>(store: &S, poll: &Poll) -> Result<PollTally, StoreError> {
    let records = store.get_poll_votes(&poll.id).await?;
    Ok(tally_votes(&poll.candidates, &records))
}

/// Tallies for every ended poll, newest first.
pub async fn poll_results<S: DocumentStore>(store: &S) -> Result<Vec<PollResult>, StoreError> {
    let mut results = Vec::new();
    for poll in store.get_polls().await? {
        if poll.status != PollStatus::Ended {
            continue;
        }
        let tally = poll_tally(store, &poll).await?;
        results.push(PollResult { poll, tally });
    }
    Ok(results)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateTotal {
    pub name: String,
    pub votes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentPoll {
    pub id: String,
    pub title: String,
    pub candidate_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminStats {
    pub total_votes: u64,
    /// Aggregated by candidate name across polls, most votes first.
    pub candidates: Vec<CandidateTotal>,
    pub recent: Vec<RecentPoll>,
}

pub async fn admin_stats<S: DocumentStore>(
    store: &S,
    polls: &[Poll],
) -> Result<AdminStats, StoreError> {
    let mut totals: Vec<CandidateTotal> = Vec::new();
    let mut total_votes = 0;

    for poll in polls {
        for record in store.get_poll_votes(&poll.id).await? {
            let name = match poll.candidate_name(record.candidate_index) {
                Some(name) => name.to_string(),
                None => format!("Option {}", record.candidate_index.as_usize() + 1),
            };
            match totals.iter_mut().find(|t| t.name == name) {
                Some(total) => total.votes += 1,
                None => totals.push(CandidateTotal { name, votes: 1 }),
            }
            total_votes += 1;
        }
    }
    totals.sort_by(|a, b| b.votes.cmp(&a.votes));

    let recent = polls
        .iter()
        .take(RECENT_POLLS)
        .map(|p| RecentPoll {
            id: p.id.clone(),
            title: p.title.clone(),
            candidate_count: p.candidates.len(),
        })
        .collect();

    Ok(AdminStats {
        total_votes,
        candidates: totals,
        recent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{poll_with_status, test_store};
    use chrono::Utc;
    use votechain_models::{CandidateIndex, ChainCandidateId};

    fn candidates(votes: &[u64]) -> Vec<Candidate> {
        votes
            .iter()
            .enumerate()
            .map(|(i, v)| Candidate {
                id: ChainCandidateId(i as u64 + 1),
                name: format!("C{i}"),
                vote_count: *v,
            })
            .collect()
    }

    fn records(indices: &[u32]) -> Vec<VoteRecord> {
        indices
            .iter()
            .enumerate()
            .map(|(i, idx)| VoteRecord {
                id: format!("v{i}"),
                poll_id: "p".into(),
                user_id: format!("u{i}"),
                candidate_index: CandidateIndex(*idx),
                wallet_address: String::new(),
                created_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn confidence_is_relative_to_the_leader() {
        assert_eq!(confidence(&candidates(&[10, 15, 0])), vec![67, 100, 0]);
        assert_eq!(confidence(&candidates(&[0, 0])), vec![0, 0]);
        assert_eq!(confidence(&candidates(&[1, 2])), vec![50, 100]);
        assert!(confidence(&[]).is_empty());
    }

    #[test]
    fn tally_counts_and_formats() {
        let names = vec!["A".to_string(), "B".to_string()];
        let tally = tally_votes(&names, &records(&[0, 0, 1]));

        assert_eq!(tally.total_votes, 3);
        assert_eq!(tally.to_string(), "A: 2 votes (66.7%)\nB: 1 vote (33.3%)");
    }

    #[test]
    fn tally_skips_unknown_indices() {
        let names = vec!["A".to_string()];
        let tally = tally_votes(&names, &records(&[0, 4]));
        assert_eq!(tally.total_votes, 1);
        assert_eq!(tally.discarded, 1);
        assert_eq!(tally.candidates[0].percentage, 100.0);
    }

    #[test]
    fn empty_tally_has_zero_percentages() {
        let names = vec!["A".to_string(), "B".to_string()];
        let tally = tally_votes(&names, &[]);
        assert_eq!(tally.total_votes, 0);
        assert!(tally.candidates.iter().all(|c| c.percentage == 0.0));
        assert_eq!(tally.candidates[1].to_string(), "B: 0 votes (0.0%)");
    }

    #[tokio::test]
    async fn results_cover_only_ended_polls() {
        let store = test_store().await;
        let ended = poll_with_status(&store, "Closed", &["A", "B"], PollStatus::Ended).await;
        poll_with_status(&store, "Open", &["X"], PollStatus::Active).await;
        store
            .record_vote(&ended.id, "u1", CandidateIndex(1), "0x1")
            .await
            .expect("vote");

        let results = poll_results(&store).await.expect("results");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].poll.id, ended.id);
        assert_eq!(results[0].tally.candidates[1].votes, 1);
    }

    #[tokio::test]
    async fn stats_aggregate_by_name_across_polls() {
        let store = test_store().await;
        let first = poll_with_status(&store, "One", &["Ada", "Bob"], PollStatus::Ended).await;
        let second = poll_with_status(&store, "Two", &["Bob"], PollStatus::Ended).await;
        for (poll, user, idx) in [
            (&first, "u1", 1),
            (&first, "u2", 0),
            (&second, "u1", 0),
            (&second, "u3", 3),
        ] {
            store
                .record_vote(&poll.id, user, CandidateIndex(idx), "0x1")
                .await
                .expect("vote");
        }

        let polls = store.get_polls().await.expect("polls");
        let stats = admin_stats(&store, &polls).await.expect("stats");

        assert_eq!(stats.total_votes, 4);
        assert_eq!(
            stats.candidates[0],
            CandidateTotal {
                name: "Bob".into(),
                votes: 2
            }
        );
        assert!(stats
            .candidates
            .iter()
            .any(|c| c.name == "Option 4" && c.votes == 1));
        assert_eq!(stats.recent.len(), 2);
        assert_eq!(stats.recent[0].title, "Two");
        assert_eq!(stats.recent[1].candidate_count, 2);
    }
}
