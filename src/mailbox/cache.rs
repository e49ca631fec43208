//! Session cache bridge.
//!
//! Persists a mailbox's ordered UID list between requests. The persisted
//! record is only a hint: a missing, stale or unreadable record just means
//! the next request rebuilds from the remote store. Concurrent requests for
//! the same mailbox race on the write and the last writer wins.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Prefs, Protocol};
use crate::remote::Uid;

const CACHE_VERSION: u32 = 1;

/// Key-value slot storage scoped to one user session.
pub trait SessionStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Session store held in process memory.
#[derive(Default)]
pub struct MemorySessionStore {
    slots: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.slots
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().map(|s| s.contains_key(key)).unwrap_or(false)
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct SlotFile {
    version: u32,
    value: Vec<u8>,
}

/// Session store with one file per key (binary format for speed).
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_prefs(prefs: &Prefs) -> Self {
        Self::new(prefs.session_dir())
    }

    /// Keys contain mailbox names, so they are hex encoded into file names.
    fn slot_path(&self, key: &str) -> PathBuf {
        let name: String = key.bytes().map(|b| format!("{:02x}", b)).collect();
        self.dir.join(format!("{}.bin", name))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let file = match File::open(self.slot_path(key)) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let slot: SlotFile = match bincode::deserialize_from(BufReader::new(file)) {
            Ok(s) => s,
            Err(e) => {
                debug!(key, error = %e, "discarding unreadable session slot");
                return Ok(None);
            }
        };

        if slot.version != CACHE_VERSION {
            return Ok(None);
        }

        Ok(Some(slot.value))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let slot = SlotFile {
            version: CACHE_VERSION,
            value: value.to_vec(),
        };

        // Write aside and rename so readers never see a torn slot
        let tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            bincode::serialize_into(&mut writer, &slot)?;
            writer.flush()?;
        }
        tmp.persist(self.slot_path(key))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.slot_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// IMAP UIDs are stored as integers, which keeps the record small; POP3
/// UIDLs (or anything non-numeric) stay strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredIds {
    Numeric(Vec<u32>),
    Text(Vec<String>),
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    #[serde(rename = "s")]
    sorted: StoredIds,
    #[serde(rename = "m", default, skip_serializing_if = "Vec::is_empty")]
    mailboxes: Vec<String>,
}

/// Ordered list restored from the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedList {
    pub uids: Vec<Uid>,
    /// Parallel to `uids` for saved searches, empty otherwise.
    pub mailboxes: Vec<String>,
}

/// Encodes index state into session slots.
#[derive(Clone, Copy)]
pub struct SessionCache<'a> {
    store: &'a dyn SessionStore,
    protocol: Protocol,
}

impl<'a> SessionCache<'a> {
    pub fn new(store: &'a dyn SessionStore, protocol: Protocol) -> Self {
        Self { store, protocol }
    }

    fn list_key(mailbox: &str) -> String {
        format!("imp_mailbox/{}", mailbox)
    }

    fn page_key(mailbox: &str) -> String {
        format!("mbox_page/{}", mailbox)
    }

    /// Load the persisted list. A record that cannot be decoded, or whose
    /// shape does not fit the mailbox kind, reads as absent.
    pub fn load(&self, mailbox: &str, is_search: bool) -> Result<Option<CachedList>> {
        let raw = match self.store.get(&Self::list_key(mailbox))? {
            Some(r) => r,
            None => return Ok(None),
        };

        let record: CacheRecord = match serde_json::from_slice(&raw) {
            Ok(r) => r,
            Err(e) => {
                debug!(mailbox, error = %e, "discarding corrupt index record");
                return Ok(None);
            }
        };

        let uids: Vec<Uid> = match record.sorted {
            StoredIds::Numeric(ids) => ids.into_iter().map(Uid::from).collect(),
            StoredIds::Text(ids) => ids.into_iter().map(Uid::from).collect(),
        };

        let fits = if is_search {
            record.mailboxes.len() == uids.len()
        } else {
            record.mailboxes.is_empty()
        };
        if !fits {
            debug!(mailbox, "discarding index record of the wrong shape");
            return Ok(None);
        }

        Ok(Some(CachedList {
            uids,
            mailboxes: record.mailboxes,
        }))
    }

    pub fn store(&self, mailbox: &str, uids: &[Uid], mailboxes: &[String]) -> Result<()> {
        let record = CacheRecord {
            sorted: self.encode_ids(uids),
            mailboxes: mailboxes.to_vec(),
        };
        let raw = serde_json::to_vec(&record)?;
        debug!(mailbox, count = uids.len(), bytes = raw.len(), "storing index record");
        self.store.put(&Self::list_key(mailbox), &raw)
    }

    pub fn forget(&self, mailbox: &str) -> Result<()> {
        self.store.remove(&Self::list_key(mailbox))
    }

    /// Page last shown for `mailbox` in this session.
    pub fn remembered_page(&self, mailbox: &str) -> Result<Option<usize>> {
        let raw = match self.store.get(&Self::page_key(mailbox))? {
            Some(r) => r,
            None => return Ok(None),
        };
        Ok(serde_json::from_slice::<usize>(&raw).ok().filter(|&p| p > 0))
    }

    pub fn remember_page(&self, mailbox: &str, page: usize) -> Result<()> {
        let raw = serde_json::to_vec(&page)?;
        self.store.put(&Self::page_key(mailbox), &raw)
    }

    fn encode_ids(&self, uids: &[Uid]) -> StoredIds {
        if self.protocol == Protocol::Imap {
            let numeric: Option<Vec<u32>> = uids
                .iter()
                .map(|u| u.as_number().filter(|n| n.to_string() == u.as_str()))
                .collect();
            if let Some(ids) = numeric {
                return StoredIds::Numeric(ids);
            }
        }
        StoredIds::Text(uids.iter().map(|u| u.as_str().to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uids(ns: &[u32]) -> Vec<Uid> {
        ns.iter().map(|&n| Uid::from(n)).collect()
    }

    #[test]
    fn test_imap_ids_stored_as_integers() {
        let store = MemorySessionStore::new();
        let cache = SessionCache::new(&store, Protocol::Imap);
        cache.store("INBOX", &uids(&[3, 1, 2]), &[]).unwrap();

        let raw = store.get("imp_mailbox/INBOX").unwrap().unwrap();
        assert_eq!(String::from_utf8(raw).unwrap(), r#"{"s":[3,1,2]}"#);

        let loaded = cache.load("INBOX", false).unwrap().unwrap();
        assert_eq!(loaded.uids, uids(&[3, 1, 2]));
        assert!(loaded.mailboxes.is_empty());
    }

    #[test]
    fn test_pop_ids_stored_as_text() {
        let store = MemorySessionStore::new();
        let cache = SessionCache::new(&store, Protocol::Pop);
        let ids = vec![Uid::from("a1b2"), Uid::from("17")];
        cache.store("INBOX", &ids, &[]).unwrap();

        let raw = store.get("imp_mailbox/INBOX").unwrap().unwrap();
        assert_eq!(String::from_utf8(raw).unwrap(), r#"{"s":["a1b2","17"]}"#);
        assert_eq!(cache.load("INBOX", false).unwrap().unwrap().uids, ids);
    }

    #[test]
    fn test_search_record_keeps_origins() {
        let store = MemorySessionStore::new();
        let cache = SessionCache::new(&store, Protocol::Imap);
        let mailboxes = vec!["INBOX".to_string(), "Sent".to_string()];
        cache.store("search1", &uids(&[5, 5]), &mailboxes).unwrap();

        let loaded = cache.load("search1", true).unwrap().unwrap();
        assert_eq!(loaded.uids, uids(&[5, 5]));
        assert_eq!(loaded.mailboxes, mailboxes);
    }

    #[test]
    fn test_corrupt_or_misshapen_record_reads_as_absent() {
        let store = MemorySessionStore::new();
        let cache = SessionCache::new(&store, Protocol::Imap);

        store.put("imp_mailbox/INBOX", b"{not json").unwrap();
        assert!(cache.load("INBOX", false).unwrap().is_none());

        // Origins shorter than the id list
        store.put("imp_mailbox/search1", br#"{"s":[1,2],"m":["INBOX"]}"#).unwrap();
        assert!(cache.load("search1", true).unwrap().is_none());

        // A plain list loaded as a saved search has no origins
        cache.store("INBOX", &uids(&[1]), &[]).unwrap();
        assert!(cache.load("INBOX", true).unwrap().is_none());
    }

    #[test]
    fn test_remembered_page() {
        let store = MemorySessionStore::new();
        let cache = SessionCache::new(&store, Protocol::Imap);
        assert_eq!(cache.remembered_page("INBOX").unwrap(), None);
        cache.remember_page("INBOX", 4).unwrap();
        assert_eq!(cache.remembered_page("INBOX").unwrap(), Some(4));
        assert_eq!(cache.remembered_page("Sent").unwrap(), None);
    }

    #[test]
    fn test_forget() {
        let store = MemorySessionStore::new();
        let cache = SessionCache::new(&store, Protocol::Imap);
        cache.store("INBOX", &uids(&[1]), &[]).unwrap();
        cache.forget("INBOX").unwrap();
        assert!(!store.contains("imp_mailbox/INBOX"));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session"));
        assert_eq!(store.get("imp_mailbox/INBOX").unwrap(), None);

        store.put("imp_mailbox/INBOX", b"[1,2,3]").unwrap();
        store.put("imp_mailbox/INBOX", b"[4]").unwrap();
        assert_eq!(store.get("imp_mailbox/INBOX").unwrap(), Some(b"[4]".to_vec()));

        store.remove("imp_mailbox/INBOX").unwrap();
        store.remove("imp_mailbox/INBOX").unwrap();
        assert_eq!(store.get("imp_mailbox/INBOX").unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_garbage_and_old_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        fs::write(store.slot_path("a"), b"\x01").unwrap();
        assert_eq!(store.get("a").unwrap(), None);

        let old = SlotFile {
            version: CACHE_VERSION + 1,
            value: b"[1]".to_vec(),
        };
        fs::write(store.slot_path("b"), bincode::serialize(&old).unwrap()).unwrap();
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn test_file_store_keys_with_separators() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.put("imp_mailbox/INBOX/Lists/rust", b"[9]").unwrap();
        assert_eq!(store.get("imp_mailbox/INBOX/Lists/rust").unwrap(), Some(b"[9]".to_vec()));
    }
}
