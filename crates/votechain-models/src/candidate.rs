use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical 0-based position of a candidate inside a poll's candidate list.
///
/// This is the representation stored in vote records. The contract numbers
/// candidates from 1; use [`CandidateIndex::to_chain_id`] and
/// [`ChainCandidateId::to_index`] at the chain boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateIndex(pub u32);

impl CandidateIndex {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub fn to_chain_id(self) -> ChainCandidateId {
        ChainCandidateId(u64::from(self.0) + 1)
    }
}

impl fmt::Display for CandidateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 1-based candidate identifier as reported by the voting contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainCandidateId(pub u64);

impl ChainCandidateId {
    /// `None` for id 0, which the contract never assigns.
    pub fn to_index(self) -> Option<CandidateIndex> {
        let index = self.0.checked_sub(1)?;
        u32::try_from(index).ok().map(CandidateIndex)
    }
}

impl fmt::Display for ChainCandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// On-chain candidate with its authoritative vote count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: ChainCandidateId,
    pub name: String,
    pub vote_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VotingStatus {
    pub active: bool,
    pub total_votes: u64,
    pub candidate_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_chain_id_are_offset_by_one() {
        assert_eq!(CandidateIndex(0).to_chain_id(), ChainCandidateId(1));
        assert_eq!(ChainCandidateId(3).to_index(), Some(CandidateIndex(2)));
    }

    #[test]
    fn chain_id_zero_has_no_index() {
        assert_eq!(ChainCandidateId(0).to_index(), None);
    }
}
