use std::collections::HashMap;

use anyhow::{Result, anyhow};
use serde::Deserialize;
use tracing::debug;

use super::client::{RemoteStore, SavedSearches};
use super::types::{SearchQuery, SortPref, Uid};

/// Definition of a saved search ("virtual mailbox").
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SavedSearch {
    /// Physical mailboxes searched, in result order.
    pub mailboxes: Vec<String>,
    #[serde(default)]
    pub query: SearchQuery,
    #[serde(default)]
    pub sort: SortPref,
}

/// Evaluates saved searches against a remote store, concatenating the
/// sorted per-mailbox results.
pub struct SearchRunner<'a> {
    store: &'a dyn RemoteStore,
    searches: HashMap<String, SavedSearch>,
}

impl<'a> SearchRunner<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self {
            store,
            searches: HashMap::new(),
        }
    }

    pub fn add(&mut self, name: impl Into<String>, search: SavedSearch) {
        self.searches.insert(name.into(), search);
    }
}

impl SavedSearches for SearchRunner<'_> {
    fn is_search_mailbox(&self, name: &str) -> bool {
        self.searches.contains_key(name)
    }

    fn run(&self, name: &str, extra: Option<&SearchQuery>) -> Result<Vec<(String, Uid)>> {
        let search = self
            .searches
            .get(name)
            .ok_or_else(|| anyhow!("unknown saved search: {}", name))?;

        let query = match extra {
            Some(extra) => search.query.clone().and(extra),
            None => search.query.clone(),
        };
        let query = (!query.is_empty()).then_some(query);

        let mut results = Vec::new();
        for mailbox in &search.mailboxes {
            let uids = self.store.sort(
                mailbox,
                query.as_ref(),
                search.sort.by,
                search.sort.dir.is_descending(),
            )?;
            debug!(search = name, mailbox = %mailbox, count = uids.len(), "saved search hits");
            results.extend(uids.into_iter().map(|uid| (mailbox.clone(), uid)));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::{MemoryMessage, MemoryStore};
    use crate::remote::{Flag, SortKey};

    #[test]
    fn test_run_merges_mailboxes_in_order() {
        let store = MemoryStore::new();
        store.append("INBOX", MemoryMessage::new("a", "2026-01-01")).unwrap();
        store
            .append("INBOX", MemoryMessage::new("b", "2026-01-02").with_flag(Flag::Flagged))
            .unwrap();
        store
            .append("Archive", MemoryMessage::new("c", "2026-01-03").with_flag(Flag::Flagged))
            .unwrap();

        let mut runner = SearchRunner::new(&store);
        runner.add(
            "flagged",
            SavedSearch {
                mailboxes: vec!["INBOX".to_string(), "Archive".to_string()],
                query: SearchQuery::new().flag(Flag::Flagged, true),
                sort: SortPref {
                    by: SortKey::Date,
                    ..Default::default()
                },
            },
        );

        assert!(runner.is_search_mailbox("flagged"));
        assert!(!runner.is_search_mailbox("INBOX"));

        let hits = runner.run("flagged", None).unwrap();
        assert_eq!(
            hits,
            vec![
                ("INBOX".to_string(), Uid::from(2u32)),
                ("Archive".to_string(), Uid::from(1u32)),
            ]
        );
    }

    #[test]
    fn test_unknown_search_is_error() {
        let store = MemoryStore::new();
        let runner = SearchRunner::new(&store);
        assert!(runner.run("nope", None).is_err());
    }
}
