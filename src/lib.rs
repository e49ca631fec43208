pub mod config;
pub mod error;
pub mod mailbox;
pub mod remote;

pub use config::Prefs;
pub use error::IndexError;
pub use mailbox::{Context, Entry, Indices, MailboxIndex, Removal};
