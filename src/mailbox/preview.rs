use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use mail_parser::MessageParser;
use serde::{Deserialize, Serialize};

use crate::remote::{RemoteStore, Uid};

/// Short plain-text snippet of a message body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub text: String,
    /// The body was longer than the snippet.
    pub cut: bool,
}

/// Produces previews for messages on the remote store.
pub trait Previewer {
    fn preview(&self, store: &dyn RemoteStore, mailbox: &str, uid: &Uid) -> Result<Preview>;
}

/// Previewer that downloads the raw message and extracts its text body.
pub struct MessagePreviewer {
    max_len: usize,
}

impl MessagePreviewer {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Previewer for MessagePreviewer {
    fn preview(&self, store: &dyn RemoteStore, mailbox: &str, uid: &Uid) -> Result<Preview> {
        let raw = store.fetch_raw(mailbox, uid)?;
        generate_preview(&raw, self.max_len)
    }
}

/// Build a preview from an RFC 822 message.
///
/// Uses the first text body; an HTML-only message is converted to plain text
/// by the parser. Quoted reply lines are dropped and whitespace is collapsed before
/// truncating to `max_len` characters.
pub fn generate_preview(raw: &[u8], max_len: usize) -> Result<Preview> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| anyhow!("Failed to parse message"))?;

    let body = message
        .body_text(0)
        .map(|b| b.into_owned())
        .unwrap_or_default();

    let text = body
        .lines()
        .filter(|line| !line.trim_start().starts_with('>'))
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");

    let cut = text.chars().count() > max_len;
    let text = if cut {
        text.chars().take(max_len).collect()
    } else {
        text
    };

    Ok(Preview { text, cut })
}

/// Per-mailbox store of computed previews.
///
/// Entries are tagged with the mailbox's UID validity; storing under a new
/// validity discards everything kept for the old one.
pub trait PreviewCache {
    fn get(&self, mailbox: &str, ids: &[Uid]) -> Result<HashMap<Uid, Preview>>;
    fn set(&self, mailbox: &str, previews: HashMap<Uid, Preview>, uid_validity: u32) -> Result<()>;
}

#[derive(Default)]
struct CachedPreviews {
    uid_validity: u32,
    previews: HashMap<Uid, Preview>,
}

#[derive(Default)]
pub struct MemoryPreviewCache {
    mailboxes: Mutex<HashMap<String, CachedPreviews>>,
}

impl MemoryPreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CachedPreviews>>> {
        self.mailboxes
            .lock()
            .map_err(|_| anyhow!("preview cache lock poisoned"))
    }

    /// Number of previews held for `mailbox`.
    pub fn len(&self, mailbox: &str) -> usize {
        self.lock()
            .map(|m| m.get(mailbox).map_or(0, |c| c.previews.len()))
            .unwrap_or(0)
    }
}

impl PreviewCache for MemoryPreviewCache {
    fn get(&self, mailbox: &str, ids: &[Uid]) -> Result<HashMap<Uid, Preview>> {
        let boxes = self.lock()?;
        let Some(cached) = boxes.get(mailbox) else {
            return Ok(HashMap::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| cached.previews.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }

    fn set(&self, mailbox: &str, previews: HashMap<Uid, Preview>, uid_validity: u32) -> Result<()> {
        let mut boxes = self.lock()?;
        let cached = boxes.entry(mailbox.to_string()).or_default();
        if cached.uid_validity != uid_validity {
            cached.previews.clear();
            cached.uid_validity = uid_validity;
        }
        cached.previews.extend(previews);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &[u8] = b"From: alice@example.com\r\n\
To: bob@example.com\r\n\
Subject: Lunch\r\n\
\r\n\
Are we   still on\r\n\
for lunch tomorrow?\r\n\
> quoted text\r\n";

    #[test]
    fn test_preview_collapses_whitespace_and_drops_quotes() {
        let preview = generate_preview(PLAIN, 100).unwrap();
        assert_eq!(preview.text, "Are we still on for lunch tomorrow?");
        assert!(!preview.cut);
    }

    #[test]
    fn test_preview_of_html_only_message_has_no_markup() {
        let raw = b"From: alice@example.com\r\n\
Subject: Newsletter\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><body><p>Spring <b>sale</b> starts today</p></body></html>\r\n";
        let preview = generate_preview(raw, 100).unwrap();
        assert!(preview.text.contains("Spring"));
        assert!(preview.text.contains("starts today"));
        assert!(!preview.text.contains('<'));
    }

    #[test]
    fn test_preview_truncates() {
        let preview = generate_preview(PLAIN, 6).unwrap();
        assert_eq!(preview.text, "Are we");
        assert!(preview.cut);
    }

    #[test]
    fn test_preview_cache_validity() {
        let cache = MemoryPreviewCache::new();
        let uid = Uid::from(1u32);
        let preview = Preview {
            text: "hi".to_string(),
            cut: false,
        };

        cache
            .set("INBOX", HashMap::from([(uid.clone(), preview.clone())]), 7)
            .unwrap();
        let hits = cache.get("INBOX", &[uid.clone(), Uid::from(2u32)]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[&uid], preview);

        // Mailbox recreated: old previews are gone
        cache
            .set("INBOX", HashMap::from([(Uid::from(2u32), Preview::default())]), 8)
            .unwrap();
        assert!(cache.get("INBOX", &[uid]).unwrap().is_empty());
        assert_eq!(cache.len("INBOX"), 1);
    }
}
