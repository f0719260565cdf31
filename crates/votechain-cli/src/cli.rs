use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use votechain_core::Theme;
use votechain_models::Role;

#[derive(Parser, Debug)]
#[command(name = "votechain", about = "Blockchain-backed polls from the terminal", version)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "votechain.toml")]
    pub config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in with Google
    Login,
    /// Sign out and forget the saved session
    Logout,
    /// Show the signed-in user and role
    Whoami,
    /// Manage polls
    Polls {
        #[command(subcommand)]
        command: PollCommand,
    },
    /// Show the active poll and whether you have voted
    Ballot,
    /// Vote in the active poll (or the one given)
    Vote {
        /// Candidate number as listed by `ballot` (starting at 1)
        candidate: u32,
        #[arg(long)]
        poll: Option<String>,
    },
    /// Results of ended polls
    Results {
        /// Show a single poll, whatever its status
        #[arg(long)]
        poll: Option<String>,
    },
    /// Vote totals across every poll (admin)
    Stats,
    /// Contract status and owner actions
    Chain {
        #[command(subcommand)]
        command: ChainCommand,
    },
    /// Assign a role to a user (admin)
    Role {
        user_id: String,
        #[arg(value_parser = parse_role)]
        role: Role,
    },
    /// Local preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum PollCommand {
    List,
    /// Create a draft poll (admin)
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Repeat for each candidate
        #[arg(long = "candidate", required = true)]
        candidates: Vec<String>,
        /// RFC 3339 timestamp or YYYY-MM-DD; defaults to now
        #[arg(long, value_parser = parse_datetime)]
        starts: Option<DateTime<Utc>>,
        /// RFC 3339 timestamp or YYYY-MM-DD
        #[arg(long, value_parser = parse_datetime)]
        ends: DateTime<Utc>,
        /// Keep the form locally instead of publishing it
        #[arg(long)]
        save_draft: bool,
    },
    /// List locally saved drafts
    Drafts,
    /// Publish a saved draft (admin)
    Publish { index: usize },
    /// Make a poll the active one; the current active poll is ended (admin)
    Activate { id: String },
    /// End a poll (admin)
    End { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ChainCommand {
    /// Voting status and connected account
    Status,
    /// On-chain candidates with vote counts
    Candidates,
    /// Register a candidate on the contract (owner)
    AddCandidate { name: String },
    /// Open on-chain voting (owner)
    Start,
    /// Close on-chain voting (owner)
    End,
}

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
    Show,
    /// Set the theme, or toggle it when omitted
    Theme {
        #[arg(value_parser = parse_theme)]
        theme: Option<Theme>,
    },
}

fn parse_role(value: &str) -> Result<Role, String> {
    value.parse::<Role>().map_err(|e| e.to_string())
}

fn parse_theme(value: &str) -> Result<Theme, String> {
    value.parse::<Theme>()
}

pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| format!("'{value}' is neither RFC 3339 nor YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn dates_accept_day_or_timestamp() {
        let day = parse_datetime("2025-06-01").expect("day");
        assert_eq!(day.to_rfc3339(), "2025-06-01T00:00:00+00:00");
        let ts = parse_datetime("2025-06-01T10:00:00+02:00").expect("ts");
        assert_eq!(ts.to_rfc3339(), "2025-06-01T08:00:00+00:00");
        assert!(parse_datetime("June 1st").is_err());
    }

    #[test]
    fn create_collects_repeated_candidates() {
        let args = Args::try_parse_from([
            "votechain",
            "polls",
            "create",
            "--title",
            "Lunch",
            "--candidate",
            "Pizza",
            "--candidate",
            "Tacos",
            "--ends",
            "2030-01-01",
        ])
        .expect("parse");
        match args.command {
            Command::Polls {
                command: PollCommand::Create { candidates, starts, .. },
            } => {
                assert_eq!(candidates, vec!["Pizza", "Tacos"]);
                assert!(starts.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn role_argument_is_validated() {
        assert!(Args::try_parse_from(["votechain", "role", "uid-1", "admin"]).is_ok());
        assert!(Args::try_parse_from(["votechain", "role", "uid-1", "owner"]).is_err());
    }
}
