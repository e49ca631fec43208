use std::fmt;

use serde::{Deserialize, Serialize};

/// Message identifier, stable within one physical mailbox only.
///
/// IMAP UIDs are numeric, POP3 UIDLs are arbitrary strings, so the native
/// representation is kept as text and numeric access is opt-in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, if this identifier is a plain IMAP UID.
    pub fn as_number(&self) -> Option<u32> {
        self.0.parse().ok()
    }
}

impl From<u32> for Uid {
    fn from(n: u32) -> Self {
        Self(n.to_string())
    }
}

impl From<&str> for Uid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Uid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// System flags the index filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    Seen,
    Answered,
    Flagged,
    Deleted,
    Draft,
    Recent,
}

/// Conjunctive search criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// `(flag, wanted)`: `wanted == false` means the flag must be absent.
    #[serde(default)]
    pub flags: Vec<(Flag, bool)>,
    /// `(header name, substring)` pairs, matched case-insensitively.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(mut self, flag: Flag, set: bool) -> Self {
        self.flags.push((flag, set));
        self
    }

    pub fn header_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Combine two queries (logical AND).
    pub fn and(mut self, other: &SearchQuery) -> Self {
        self.flags.extend(other.flags.iter().copied());
        self.headers.extend(other.headers.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.headers.is_empty()
    }

    /// Query hiding messages marked `\Deleted`.
    pub fn undeleted() -> Self {
        Self::new().flag(Flag::Deleted, false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Sequence,
    Arrival,
    Date,
    From,
    To,
    Subject,
    Size,
    Thread,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Sequence => "sequence",
            SortKey::Arrival => "arrival",
            SortKey::Date => "date",
            SortKey::From => "from",
            SortKey::To => "to",
            SortKey::Subject => "subject",
            SortKey::Size => "size",
            SortKey::Thread => "thread",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn is_descending(&self) -> bool {
        matches!(self, SortDirection::Descending)
    }
}

/// Active sort for one mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortPref {
    pub by: SortKey,
    pub dir: SortDirection,
}

impl Default for SortPref {
    fn default() -> Self {
        Self {
            by: SortKey::Arrival,
            dir: SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadCriteria {
    #[default]
    References,
    OrderedSubject,
}

/// Items requested from a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusItem {
    Messages,
    Recent,
    Unseen,
    FirstUnseen,
    UidNext,
    UidValidity,
    HighestModSeq,
}

/// Status answer; only the requested items are guaranteed to be filled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    pub messages: Option<u32>,
    pub recent: Option<u32>,
    pub unseen: Option<u32>,
    /// Sequence number of the first unseen message.
    pub first_unseen: Option<u32>,
    pub uid_next: Option<u32>,
    pub uid_validity: Option<u32>,
    /// Flag-change epoch, when the server supports CONDSTORE.
    pub highest_modseq: Option<u64>,
}

/// Shape of a search answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResults {
    Count,
    Match,
    Min,
    Max,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub count: usize,
    pub matches: Vec<Uid>,
    pub min: Option<Uid>,
    pub max: Option<Uid>,
}

/// Optional fetch items. Envelope, flags, size and UID are always fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchFields {
    /// Importance, List-Post and X-Priority headers.
    pub headers: bool,
    pub structure: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Address {
    pub name: Option<String>,
    pub addr: String,
}

impl Address {
    pub fn display(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.addr.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Envelope {
    pub subject: Option<String>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub date: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

impl Envelope {
    pub fn from_display(&self) -> String {
        match &self.from {
            Some(addr) => addr.display(),
            None => "(unknown)".to_string(),
        }
    }
}

/// Body structure node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MimePart {
    pub content_type: String,
    #[serde(default)]
    pub parts: Vec<MimePart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub uid: Uid,
    pub envelope: Envelope,
    pub flags: Vec<Flag>,
    pub size: u64,
    pub headers: Option<Vec<(String, String)>>,
    pub structure: Option<MimePart>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_numeric() {
        assert_eq!(Uid::from(42u32).as_number(), Some(42));
        assert_eq!(Uid::from("UIDL-abc").as_number(), None);
    }

    #[test]
    fn test_query_combine() {
        let q = SearchQuery::undeleted().and(&SearchQuery::new().flag(Flag::Seen, false));
        assert_eq!(q.flags, vec![(Flag::Deleted, false), (Flag::Seen, false)]);
        assert!(SearchQuery::new().is_empty());
    }
}
