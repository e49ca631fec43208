//! In-memory remote store.
//!
//! Behaves like a small IMAP server: UIDs are assigned from `uid_next`,
//! sequence numbers follow arrival order, every mutation bumps the
//! modification sequence. Calls are counted so callers can assert how many
//! round trips an operation cost, and failures can be injected.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, anyhow, bail};

use super::client::RemoteStore;
use super::types::{
    Envelope, FetchFields, FetchedMessage, Flag, MailboxStatus, MimePart, SearchQuery,
    SearchResult, SearchResults, SortKey, StatusItem, ThreadCriteria, Uid,
};
use crate::mailbox::ThreadTree;

#[derive(Debug, Clone, Default)]
pub struct MemoryMessage {
    pub envelope: Envelope,
    pub flags: Vec<Flag>,
    pub headers: Vec<(String, String)>,
    pub raw: Vec<u8>,
}

impl MemoryMessage {
    pub fn new(subject: &str, date: &str) -> Self {
        Self {
            envelope: Envelope {
                subject: Some(subject.to_string()),
                date: Some(date.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_flag(mut self, flag: Flag) -> Self {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_raw(mut self, raw: &[u8]) -> Self {
        self.raw = raw.to_vec();
        self
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    uid: u32,
    message: MemoryMessage,
}

#[derive(Debug, Clone)]
struct MemoryMailbox {
    uid_validity: u32,
    uid_next: u32,
    modseq: u64,
    messages: Vec<StoredMessage>,
}

impl MemoryMailbox {
    fn new(uid_validity: u32) -> Self {
        Self {
            uid_validity,
            uid_next: 1,
            modseq: 1,
            messages: Vec::new(),
        }
    }

    /// `(sequence number, message)` pairs matching `query`.
    fn matching<'a>(&'a self, query: Option<&SearchQuery>) -> Vec<(u32, &'a StoredMessage)> {
        self.messages
            .iter()
            .enumerate()
            .map(|(i, m)| (i as u32 + 1, m))
            .filter(|(_, m)| query.is_none_or(|q| matches_query(&m.message, q)))
            .collect()
    }
}

fn matches_query(message: &MemoryMessage, query: &SearchQuery) -> bool {
    let flags_ok = query
        .flags
        .iter()
        .all(|(flag, set)| message.flags.contains(flag) == *set);
    let headers_ok = query.headers.iter().all(|(name, value)| {
        let value = value.to_lowercase();
        message
            .headers
            .iter()
            .any(|(n, v)| n.eq_ignore_ascii_case(name) && v.to_lowercase().contains(&value))
    });
    flags_ok && headers_ok
}

pub struct MemoryStore {
    mailboxes: Mutex<HashMap<String, MemoryMailbox>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    condstore: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            mailboxes: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            condstore: true,
        }
    }

    /// Store without CONDSTORE: flag changes are not visible in status.
    pub fn without_condstore() -> Self {
        Self {
            condstore: false,
            ..Self::new()
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryMailbox>>> {
        self.mailboxes
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Count a round trip and fail it if failures are being injected.
    fn begin_call(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            bail!("connection to mail server lost");
        }
        Ok(())
    }

    pub fn create_mailbox(&self, name: &str, uid_validity: u32) -> Result<()> {
        self.lock()?
            .entry(name.to_string())
            .or_insert_with(|| MemoryMailbox::new(uid_validity));
        Ok(())
    }

    /// Append a message, returning its UID.
    pub fn append(&self, mailbox: &str, message: MemoryMessage) -> Result<Uid> {
        let mut boxes = self.lock()?;
        let mbox = boxes
            .entry(mailbox.to_string())
            .or_insert_with(|| MemoryMailbox::new(1));
        let uid = mbox.uid_next;
        mbox.uid_next += 1;
        mbox.modseq += 1;
        mbox.messages.push(StoredMessage { uid, message });
        Ok(Uid::from(uid))
    }

    pub fn set_flag(&self, mailbox: &str, uid: &Uid, flag: Flag, set: bool) -> Result<()> {
        let mut boxes = self.lock()?;
        let mbox = boxes
            .get_mut(mailbox)
            .ok_or_else(|| anyhow!("no such mailbox: {}", mailbox))?;
        let target = uid.as_number();
        let msg = mbox
            .messages
            .iter_mut()
            .find(|m| Some(m.uid) == target)
            .ok_or_else(|| anyhow!("no such message: {}", uid))?;
        msg.message.flags.retain(|f| *f != flag);
        if set {
            msg.message.flags.push(flag);
        }
        mbox.modseq += 1;
        Ok(())
    }

    /// Remove a message outright (as EXPUNGE would).
    pub fn expunge(&self, mailbox: &str, uid: &Uid) -> Result<()> {
        let mut boxes = self.lock()?;
        let mbox = boxes
            .get_mut(mailbox)
            .ok_or_else(|| anyhow!("no such mailbox: {}", mailbox))?;
        let target = uid.as_number();
        mbox.messages.retain(|m| Some(m.uid) != target);
        mbox.modseq += 1;
        Ok(())
    }

    /// Simulate the mailbox being recreated on the server.
    pub fn set_uid_validity(&self, mailbox: &str, uid_validity: u32) -> Result<()> {
        let mut boxes = self.lock()?;
        let mbox = boxes
            .get_mut(mailbox)
            .ok_or_else(|| anyhow!("no such mailbox: {}", mailbox))?;
        mbox.uid_validity = uid_validity;
        Ok(())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Number of remote calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn with_mailbox<T>(&self, mailbox: &str, f: impl FnOnce(&MemoryMailbox) -> T) -> Result<T> {
        let boxes = self.lock()?;
        let mbox = boxes
            .get(mailbox)
            .ok_or_else(|| anyhow!("no such mailbox: {}", mailbox))?;
        Ok(f(mbox))
    }
}

fn sort_value(message: &MemoryMessage, by: SortKey) -> String {
    let env = &message.envelope;
    match by {
        SortKey::Date => env.date.clone().unwrap_or_default(),
        SortKey::From => env.from_display().to_lowercase(),
        SortKey::To => env
            .to
            .as_ref()
            .map(|a| a.display().to_lowercase())
            .unwrap_or_default(),
        SortKey::Subject => env.subject.clone().unwrap_or_default().to_lowercase(),
        SortKey::Size => format!("{:020}", message.raw.len()),
        SortKey::Sequence | SortKey::Arrival | SortKey::Thread => String::new(),
    }
}

impl RemoteStore for MemoryStore {
    fn sort(
        &self,
        mailbox: &str,
        query: Option<&SearchQuery>,
        by: SortKey,
        reverse: bool,
    ) -> Result<Vec<Uid>> {
        self.begin_call()?;
        self.with_mailbox(mailbox, |mbox| {
            let mut hits = mbox.matching(query);
            // Stable sort keeps arrival order as the tie breaker
            hits.sort_by_cached_key(|(_, m)| sort_value(&m.message, by));
            if reverse {
                hits.reverse();
            }
            hits.into_iter().map(|(_, m)| Uid::from(m.uid)).collect()
        })
    }

    fn thread(&self, mailbox: &str, criteria: ThreadCriteria) -> Result<ThreadTree> {
        self.begin_call()?;
        self.with_mailbox(mailbox, |mbox| {
            let messages: Vec<(Uid, &Envelope)> = mbox
                .messages
                .iter()
                .map(|m| (Uid::from(m.uid), &m.message.envelope))
                .collect();
            match criteria {
                ThreadCriteria::References => ThreadTree::from_messages(&messages),
                ThreadCriteria::OrderedSubject => ThreadTree::from_subjects(&messages),
            }
        })
    }

    fn status(&self, mailbox: &str, items: &[StatusItem]) -> Result<MailboxStatus> {
        self.begin_call()?;
        let condstore = self.condstore;
        self.with_mailbox(mailbox, |mbox| {
            let mut status = MailboxStatus::default();
            for item in items {
                match item {
                    StatusItem::Messages => status.messages = Some(mbox.messages.len() as u32),
                    StatusItem::Recent => {
                        status.recent = Some(
                            mbox.messages
                                .iter()
                                .filter(|m| m.message.flags.contains(&Flag::Recent))
                                .count() as u32,
                        )
                    }
                    StatusItem::Unseen => {
                        status.unseen = Some(
                            mbox.messages
                                .iter()
                                .filter(|m| !m.message.flags.contains(&Flag::Seen))
                                .count() as u32,
                        )
                    }
                    StatusItem::FirstUnseen => {
                        status.first_unseen = mbox
                            .messages
                            .iter()
                            .position(|m| !m.message.flags.contains(&Flag::Seen))
                            .map(|p| p as u32 + 1)
                    }
                    StatusItem::UidNext => status.uid_next = Some(mbox.uid_next),
                    StatusItem::UidValidity => status.uid_validity = Some(mbox.uid_validity),
                    StatusItem::HighestModSeq => {
                        status.highest_modseq = condstore.then_some(mbox.modseq)
                    }
                }
            }
            status
        })
    }

    fn search(
        &self,
        mailbox: &str,
        query: &SearchQuery,
        results: SearchResults,
        sequence: bool,
    ) -> Result<SearchResult> {
        self.begin_call()?;
        self.with_mailbox(mailbox, |mbox| {
            let ids: Vec<u32> = mbox
                .matching(Some(query))
                .into_iter()
                .map(|(seq, m)| if sequence { seq } else { m.uid })
                .collect();
            let mut result = SearchResult {
                count: ids.len(),
                ..Default::default()
            };
            match results {
                SearchResults::Count => {}
                SearchResults::Match => result.matches = ids.into_iter().map(Uid::from).collect(),
                SearchResults::Min => result.min = ids.iter().min().map(|&n| Uid::from(n)),
                SearchResults::Max => result.max = ids.iter().max().map(|&n| Uid::from(n)),
            }
            result
        })
    }

    fn fetch(&self, mailbox: &str, ids: &[Uid], fields: FetchFields) -> Result<Vec<FetchedMessage>> {
        self.begin_call()?;
        self.with_mailbox(mailbox, |mbox| {
            ids.iter()
                .filter_map(|id| {
                    let n = id.as_number()?;
                    mbox.messages.iter().find(|m| m.uid == n)
                })
                .map(|m| FetchedMessage {
                    uid: Uid::from(m.uid),
                    envelope: m.message.envelope.clone(),
                    flags: m.message.flags.clone(),
                    size: m.message.raw.len() as u64,
                    headers: fields.headers.then(|| {
                        m.message
                            .headers
                            .iter()
                            .filter(|(n, _)| {
                                ["importance", "list-post", "x-priority"]
                                    .contains(&n.to_lowercase().as_str())
                            })
                            .cloned()
                            .collect()
                    }),
                    structure: fields.structure.then(|| MimePart {
                        content_type: "text/plain".to_string(),
                        parts: Vec::new(),
                    }),
                })
                .collect()
        })
    }

    fn fetch_raw(&self, mailbox: &str, uid: &Uid) -> Result<Vec<u8>> {
        self.begin_call()?;
        let target = uid.as_number();
        self.with_mailbox(mailbox, |mbox| {
            mbox.messages
                .iter()
                .find(|m| Some(m.uid) == target)
                .map(|m| m.message.raw.clone())
        })?
        .ok_or_else(|| anyhow!("no such message: {}", uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(n: usize) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_mailbox("INBOX", 7).unwrap();
        for i in 0..n {
            store
                .append("INBOX", MemoryMessage::new(&format!("msg {}", i), &format!("2026-01-{:02}", i + 1)))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_sort_and_reverse() {
        let store = store_with(3);
        let asc = store.sort("INBOX", None, SortKey::Date, false).unwrap();
        let desc = store.sort("INBOX", None, SortKey::Date, true).unwrap();
        assert_eq!(asc, vec![Uid::from(1u32), Uid::from(2u32), Uid::from(3u32)]);
        assert_eq!(desc, vec![Uid::from(3u32), Uid::from(2u32), Uid::from(1u32)]);
    }

    #[test]
    fn test_search_filters_flags() {
        let store = store_with(3);
        store.set_flag("INBOX", &Uid::from(2u32), Flag::Deleted, true).unwrap();
        let res = store
            .search("INBOX", &SearchQuery::undeleted(), SearchResults::Match, false)
            .unwrap();
        assert_eq!(res.matches, vec![Uid::from(1u32), Uid::from(3u32)]);
    }

    #[test]
    fn test_status_modseq_moves_on_flag_change() {
        let store = store_with(2);
        let before = store.status("INBOX", &[StatusItem::HighestModSeq]).unwrap();
        store.set_flag("INBOX", &Uid::from(1u32), Flag::Seen, true).unwrap();
        let after = store.status("INBOX", &[StatusItem::HighestModSeq]).unwrap();
        assert_ne!(before.highest_modseq, after.highest_modseq);
    }

    #[test]
    fn test_failure_injection_counts_calls() {
        let store = store_with(1);
        store.set_failing(true);
        assert!(store.sort("INBOX", None, SortKey::Arrival, false).is_err());
        assert_eq!(store.calls(), 1);
    }
}
