mod client;
pub mod memory;
pub mod search;
mod types;

pub use client::{NoSavedSearches, RemoteStore, SavedSearches};
pub use search::{SavedSearch, SearchRunner};
pub use types::{
    Address, Envelope, FetchFields, FetchedMessage, Flag, MailboxStatus, MimePart, SearchQuery,
    SearchResult, SearchResults, SortDirection, SortKey, SortPref, StatusItem, ThreadCriteria, Uid,
};
