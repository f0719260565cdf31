use crate::admin::PollDraft;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{other}' (expected light or dark)")),
        }
    }
}

/// Local, per-machine settings kept next to the session file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub theme: Theme,
    /// Poll forms saved locally before publishing.
    #[serde(default)]
    pub draft_polls: Vec<PollDraft>,
}

impl Preferences {
    /// Missing or unreadable files yield the defaults.
    pub async fn load(path: &Path) -> io::Result<Self> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e),
        };
        match serde_json::from_slice(&raw) {
            Ok(prefs) => Ok(prefs),
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable preferences: {e}");
                Ok(Self::default())
            }
        }
    }

    pub async fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;
        tokio::fs::write(path, raw).await
    }

    /// Remove and return the draft at `index`.
    pub fn take_draft(&mut self, index: usize) -> Option<PollDraft> {
        (index < self.draft_polls.len()).then(|| self.draft_polls.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn theme_defaults_to_dark_and_parses_loosely() {
        assert_eq!(Theme::default(), Theme::Dark);
        assert_eq!(" Light ".parse::<Theme>(), Ok(Theme::Light));
        assert!("sepia".parse::<Theme>().is_err());
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
    }

    #[tokio::test]
    async fn preferences_round_trip_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("prefs.json");
        assert_eq!(Preferences::load(&path).await.expect("load"), Preferences::default());

        let start = Utc::now();
        let mut prefs = Preferences {
            theme: Theme::Light,
            draft_polls: vec![PollDraft {
                title: "Mascot".into(),
                description: String::new(),
                candidates: vec!["Owl".into(), "Fox".into()],
                start_date: start,
                end_date: start + Duration::days(1),
            }],
        };
        prefs.save(&path).await.expect("save");
        let loaded = Preferences::load(&path).await.expect("reload");
        assert_eq!(loaded, prefs);

        assert!(prefs.take_draft(3).is_none());
        assert_eq!(prefs.take_draft(0).map(|d| d.title), Some("Mascot".to_string()));
        assert!(prefs.draft_polls.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs.json");
        tokio::fs::write(&path, b"[1,2").await.expect("write");
        assert_eq!(Preferences::load(&path).await.expect("load").theme, Theme::Dark);
    }

    #[test]
    fn legacy_file_without_drafts_still_loads() {
        let prefs: Preferences = serde_json::from_str(r#"{"theme":"light"}"#).expect("parse");
        assert_eq!(prefs.theme, Theme::Light);
        assert!(prefs.draft_polls.is_empty());
    }
}
