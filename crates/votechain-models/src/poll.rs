use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    #[default]
    Draft,
    Active,
    Ended,
}

impl PollStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PollStatus::Draft => "draft",
            PollStatus::Active => "active",
            PollStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(PollStatus::Draft),
            "active" => Ok(PollStatus::Active),
            "ended" => Ok(PollStatus::Ended),
            other => Err(ParseEnumError {
                kind: "poll status",
                value: other.to_string(),
            }),
        }
    }
}

/// A single election instance. Candidate identity within the poll is the
/// position in `candidates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub title: String,
    pub description: String,
    pub candidates: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: PollStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

impl Poll {
    pub fn is_active(&self) -> bool {
        self.status == PollStatus::Active
    }

    pub fn candidate_name(&self, index: crate::CandidateIndex) -> Option<&str> {
        self.candidates.get(index.as_usize()).map(String::as_str)
    }
}

/// Input for creating a poll. The store assigns id, status and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPoll {
    pub title: String,
    pub description: String,
    pub candidates: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_by: String,
}
