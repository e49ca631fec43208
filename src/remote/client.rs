use anyhow::Result;

use super::types::{
    FetchFields, FetchedMessage, MailboxStatus, SearchQuery, SearchResult, SearchResults,
    SortKey, StatusItem, ThreadCriteria, Uid,
};
use crate::mailbox::ThreadTree;

/// Remote mail store client. Every call is a synchronous request/response;
/// timeouts and retries belong to the implementation, not to the index.
pub trait RemoteStore {
    /// UIDs matching `query` (all messages when `None`), ordered by `by`.
    fn sort(
        &self,
        mailbox: &str,
        query: Option<&SearchQuery>,
        by: SortKey,
        reverse: bool,
    ) -> Result<Vec<Uid>>;

    /// Thread ordering of the whole mailbox.
    fn thread(&self, mailbox: &str, criteria: ThreadCriteria) -> Result<ThreadTree>;

    fn status(&self, mailbox: &str, items: &[StatusItem]) -> Result<MailboxStatus>;

    /// With `sequence` set, identifiers in the answer are sequence numbers
    /// rather than UIDs.
    fn search(
        &self,
        mailbox: &str,
        query: &SearchQuery,
        results: SearchResults,
        sequence: bool,
    ) -> Result<SearchResult>;

    /// Metadata for `ids`; identifiers that no longer exist are left out.
    fn fetch(&self, mailbox: &str, ids: &[Uid], fields: FetchFields) -> Result<Vec<FetchedMessage>>;

    /// Full RFC 5322 source of one message (used for previews).
    fn fetch_raw(&self, mailbox: &str, uid: &Uid) -> Result<Vec<u8>>;
}

/// Runner for saved searches ("virtual" mailboxes).
pub trait SavedSearches {
    fn is_search_mailbox(&self, name: &str) -> bool;

    /// `(origin mailbox, uid)` pairs, already merged across the constituent
    /// mailboxes. `extra` is ANDed with the saved definition.
    fn run(&self, name: &str, extra: Option<&SearchQuery>) -> Result<Vec<(String, Uid)>>;
}

/// Runner for deployments without saved searches.
pub struct NoSavedSearches;

impl SavedSearches for NoSavedSearches {
    fn is_search_mailbox(&self, _name: &str) -> bool {
        false
    }

    fn run(&self, name: &str, _extra: Option<&SearchQuery>) -> Result<Vec<(String, Uid)>> {
        anyhow::bail!("{} is not a saved search", name)
    }
}
