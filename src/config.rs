use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::remote::{SortPref, ThreadCriteria};

/// Where a mailbox listing opens when no page was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailboxStart {
    #[default]
    FirstPage,
    LastPage,
    FirstUnseen,
    LastUnseen,
}

/// Remote protocol. POP3 has no flags to filter on and non-numeric UIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Imap,
    Pop,
}

/// Front-end mode. Only the traditional (page-per-request) view persists
/// the index between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Traditional,
    Dynamic,
    Minimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Prefs {
    /// Messages per page
    pub page_size: usize,
    pub mailbox_start: MailboxStart,
    /// Hide messages flagged \Deleted from listings
    pub hide_deleted: bool,
    pub protocol: Protocol,
    pub view: ViewMode,
    /// Default sort
    pub sort: SortPref,
    /// Per-mailbox sort overrides
    pub mailbox_sort: HashMap<String, SortPref>,
    pub thread_criteria: ThreadCriteria,
    /// Only generate previews for unseen messages
    pub preview_show_unread: bool,
    /// Preview length in characters
    pub preview_max_len: usize,
    /// Directory for the file-backed session cache (tilde expanded)
    pub session_dir: Option<String>,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            page_size: 20,
            mailbox_start: MailboxStart::FirstPage,
            hide_deleted: false,
            protocol: Protocol::Imap,
            view: ViewMode::Traditional,
            sort: SortPref::default(),
            mailbox_sort: HashMap::new(),
            thread_criteria: ThreadCriteria::References,
            preview_show_unread: false,
            preview_max_len: 250,
            session_dir: None,
        }
    }
}

impl Prefs {
    /// Load from `<config dir>/mboxindex/prefs.toml`, falling back to defaults.
    pub fn load() -> Self {
        let path = dirs::config_dir()
            .map(|p| p.join("mboxindex/prefs.toml"))
            .unwrap_or_else(|| PathBuf::from("~/.config/mboxindex/prefs.toml"));

        if path.exists() {
            Self::load_from(&path)
        } else {
            Self::default()
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(prefs) => return prefs,
                Err(e) => warn!(path = %path.display(), error = %e, "prefs parse error"),
            },
            Err(e) => warn!(path = %path.display(), error = %e, "prefs read error"),
        }

        Self::default()
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Sort in effect for `mailbox`.
    pub fn sort_for(&self, mailbox: &str) -> SortPref {
        self.mailbox_sort.get(mailbox).copied().unwrap_or(self.sort)
    }

    /// Whether deleted messages are hidden in `mailbox`.
    pub fn hide_deleted_in(&self, _mailbox: &str) -> bool {
        self.hide_deleted && self.protocol != Protocol::Pop
    }

    /// Whether indexes are persisted across requests in this view.
    pub fn persists_index(&self) -> bool {
        self.view == ViewMode::Traditional
    }

    pub fn session_dir(&self) -> PathBuf {
        match &self.session_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).into_owned()),
            None => dirs::cache_dir()
                .map(|p| p.join("mboxindex"))
                .unwrap_or_else(|| PathBuf::from(shellexpand::tilde("~/.cache/mboxindex").into_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{SortDirection, SortKey};

    #[test]
    fn test_defaults_from_empty_toml() {
        let prefs = Prefs::from_toml("").unwrap();
        assert_eq!(prefs.page_size, 20);
        assert_eq!(prefs.mailbox_start, MailboxStart::FirstPage);
        assert!(prefs.persists_index());
    }

    #[test]
    fn test_parse_overrides() {
        let prefs = Prefs::from_toml(
            r#"
page_size = 50
mailbox_start = "first_unseen"
hide_deleted = true
view = "dynamic"

[sort]
by = "date"
dir = "descending"

[mailbox_sort.Lists]
by = "thread"
"#,
        )
        .unwrap();

        assert_eq!(prefs.page_size, 50);
        assert_eq!(prefs.mailbox_start, MailboxStart::FirstUnseen);
        assert!(!prefs.persists_index());
        assert_eq!(prefs.sort_for("INBOX").dir, SortDirection::Descending);
        assert_eq!(prefs.sort_for("Lists").by, SortKey::Thread);
    }

    #[test]
    fn test_pop_never_hides_deleted() {
        let prefs = Prefs {
            hide_deleted: true,
            protocol: Protocol::Pop,
            ..Prefs::default()
        };
        assert!(!prefs.hide_deleted_in("INBOX"));
    }

    #[test]
    fn test_session_dir_expands_tilde() {
        let prefs = Prefs {
            session_dir: Some("~/mbox-cache".to_string()),
            ..Prefs::default()
        };
        assert!(!prefs.session_dir().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_load_from_bad_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");
        std::fs::write(&path, "page_size = \"lots\"").unwrap();
        assert_eq!(Prefs::load_from(&path).page_size, 20);
    }
}
