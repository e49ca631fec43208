pub mod cache;
mod index;
pub mod overview;
pub mod pager;
pub mod preview;
mod threading;
mod types;

pub use cache::{CachedList, FileSessionStore, MemorySessionStore, SessionCache, SessionStore};
pub use index::{Context, MailboxIndex, Removal};
pub use overview::{MessageSummary, Overview, OverviewOptions, PreviewMode};
pub use pager::{MailboxPage, PageBounds, PageInput, compute_page};
pub use preview::{MemoryPreviewCache, MessagePreviewer, Preview, PreviewCache, Previewer};
pub use threading::{ThreadNode, ThreadTree};
pub use types::{Entry, Indices, SortedList};
