use std::time::Instant;

use mboxindex::mailbox::{
    Context, Entry, FileSessionStore, MailboxIndex, MemoryPreviewCache, OverviewOptions,
    PreviewMode, Removal,
};
use mboxindex::remote::memory::{MemoryMessage, MemoryStore};
use mboxindex::remote::{Flag, NoSavedSearches, SortKey};
use mboxindex::{Indices, Prefs};
use tracing::info;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mboxindex=info".into()),
        )
        .init();

    let count: u32 = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(50_000);

    let mut prefs = Prefs::load();
    prefs.sort.by = SortKey::Date;
    let session_dir = tempfile::tempdir()?;
    prefs.session_dir = Some(session_dir.path().display().to_string());

    println!("Filling mailbox with {} messages", count);
    let start = Instant::now();
    let store = MemoryStore::new();
    store.create_mailbox("INBOX", 1)?;
    for i in 0..count {
        let mut message = MemoryMessage::new(
            &format!("Message {}", i),
            &format!("2026-01-01T{:08}", count - i),
        )
        .with_raw(format!("Subject: Message {}\r\n\r\nBody of message {}\r\n", i, i).as_bytes());
        if i % 3 == 0 {
            message = message.with_flag(Flag::Seen);
        }
        store.append("INBOX", message)?;
    }
    println!("Filled in {:?}", start.elapsed());

    let session = FileSessionStore::from_prefs(&prefs);
    let previews = MemoryPreviewCache::new();
    let ctx = Context::new(&store, &NoSavedSearches, &session, &prefs).with_preview_cache(&previews);

    // Cold build, as a listing request would do
    let build_start = Instant::now();
    let page = MailboxIndex::scoped("INBOX", ctx, None, |index| index.build_page(Some(1), None));
    println!(
        "Built {} entries ({} pages) in {:?}",
        page.msgcount,
        page.page_count,
        build_start.elapsed()
    );

    // Message view: restore from the session cache and navigate
    let restore_start = Instant::now();
    let seed = Entry::new("INBOX", count / 2);
    let calls = store.calls();
    let mut index = MailboxIndex::open("INBOX", ctx, Some(&seed));
    println!(
        "Restored index in {:?} ({} remote calls)",
        restore_start.elapsed(),
        store.calls() - calls
    );

    let nav_start = Instant::now();
    for _ in 0..1000 {
        index.advance_cursor(1);
    }
    println!("1000 navigation steps in {:?}", nav_start.elapsed());

    let overview_start = Instant::now();
    let positions: Vec<usize> = (page.begin..=page.end).collect();
    let opts = OverviewOptions {
        headers: true,
        preview: PreviewMode::Force,
        ..Default::default()
    };
    let overview = index.mailbox_array(&positions, opts);
    println!(
        "Overview of {} messages in {:?}",
        overview.messages.len(),
        overview_start.elapsed()
    );

    let remove_start = Instant::now();
    let removed: Indices = overview
        .messages
        .iter()
        .map(|m| Entry::new(m.mailbox.as_str(), m.uid.clone()))
        .collect();
    index.remove_messages(Removal::Messages(removed));
    println!("Removed a page of entries in {:?}", remove_start.elapsed());

    let flush_start = Instant::now();
    index.close()?;
    println!("Flushed in {:?}", flush_start.elapsed());

    info!(calls = store.calls(), "benchmark done");
    Ok(())
}
