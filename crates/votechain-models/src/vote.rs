use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CandidateIndex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: String,
    pub poll_id: String,
    pub user_id: String,
    pub candidate_index: CandidateIndex,
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
}
