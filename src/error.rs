//! Recoverable conditions reported by the mailbox index.
//!
//! Remote failures never abort navigation: the index degrades to an empty
//! list, a zero count or an unset cursor and records one of these so the
//! caller can decide whether to tell the user.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Mailbox listing failed for {mailbox}: {cause:#}")]
    Listing { mailbox: String, cause: anyhow::Error },

    #[error("Thread request failed for {mailbox}: {cause:#}")]
    Thread { mailbox: String, cause: anyhow::Error },

    #[error("Status request failed for {mailbox}: {cause:#}")]
    Status { mailbox: String, cause: anyhow::Error },

    #[error("Search failed in {mailbox}: {cause:#}")]
    Search { mailbox: String, cause: anyhow::Error },

    #[error("Fetch failed in {mailbox}: {cause:#}")]
    Fetch { mailbox: String, cause: anyhow::Error },

    #[error("Preview cache error for {mailbox}: {cause:#}")]
    PreviewCache { mailbox: String, cause: anyhow::Error },

    #[error("Session cache error for {mailbox}: {cause:#}")]
    Session { mailbox: String, cause: anyhow::Error },

    #[error("Found only {found} of {expected} matching messages in {mailbox}")]
    IncompleteMatches {
        mailbox: String,
        found: usize,
        expected: usize,
    },
}

impl IndexError {
    /// Mailbox the condition was raised for.
    pub fn mailbox(&self) -> &str {
        match self {
            IndexError::Listing { mailbox, .. }
            | IndexError::Thread { mailbox, .. }
            | IndexError::Status { mailbox, .. }
            | IndexError::Search { mailbox, .. }
            | IndexError::Fetch { mailbox, .. }
            | IndexError::PreviewCache { mailbox, .. }
            | IndexError::Session { mailbox, .. }
            | IndexError::IncompleteMatches { mailbox, .. } => mailbox,
        }
    }

    /// True for failures of the remote store itself.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            IndexError::Listing { .. }
                | IndexError::Thread { .. }
                | IndexError::Status { .. }
                | IndexError::Search { .. }
                | IndexError::Fetch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
