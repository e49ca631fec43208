//! Overview assembly: display positions to message summaries.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::preview::{Preview, PreviewCache, Previewer};
use super::types::Indices;
use crate::config::Prefs;
use crate::error::IndexError;
use crate::remote::{Envelope, FetchFields, Flag, MimePart, RemoteStore, StatusItem, Uid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewMode {
    #[default]
    Off,
    /// Follow the user's preview preferences.
    Prefs,
    /// Preview every message.
    Force,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OverviewOptions {
    /// Fetch the importance/list-post/x-priority headers.
    pub headers: bool,
    pub structure: bool,
    pub preview: PreviewMode,
}

/// Display positions resolved for one physical mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionGroup {
    pub mailbox: String,
    /// `(uid, 1-based position)` in request order.
    pub ids: Vec<(Uid, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageSummary {
    pub mailbox: String,
    pub uid: Uid,
    /// 1-based display position.
    pub position: usize,
    pub envelope: Envelope,
    pub flags: Vec<Flag>,
    pub size: u64,
    pub headers: Option<Vec<(String, String)>>,
    pub structure: Option<MimePart>,
    pub preview: Option<Preview>,
}

impl MessageSummary {
    pub fn is_seen(&self) -> bool {
        self.flags.contains(&Flag::Seen)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Overview {
    pub messages: Vec<MessageSummary>,
    /// Identities actually fetched, grouped by mailbox.
    pub uids: Indices,
}

/// Group 1-based `positions` by origin mailbox.
///
/// `origins` is parallel to `uids` for saved searches and empty otherwise,
/// in which case every entry belongs to `default_mailbox`. Positions with no
/// entry are skipped; a position repeated in the request is resolved once.
pub fn resolve_positions(
    positions: &[usize],
    uids: &[Uid],
    origins: &[String],
    default_mailbox: &str,
) -> Vec<PositionGroup> {
    let mut groups: Vec<PositionGroup> = Vec::new();

    for &position in positions {
        let Some(i) = position.checked_sub(1) else {
            continue;
        };
        let Some(uid) = uids.get(i) else {
            continue;
        };
        let mailbox = origins.get(i).map_or(default_mailbox, String::as_str);

        let group = match groups.iter().position(|g| g.mailbox == mailbox) {
            Some(g) => &mut groups[g],
            None => {
                groups.push(PositionGroup {
                    mailbox: mailbox.to_string(),
                    ids: Vec::new(),
                });
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };
        if !group.ids.iter().any(|(u, _)| u == uid) {
            group.ids.push((uid.clone(), position));
        }
    }

    groups
}

/// Collaborators the overview fetch needs.
pub struct OverviewSources<'a> {
    pub store: &'a dyn RemoteStore,
    pub previews: Option<&'a dyn PreviewCache>,
    pub previewer: Option<&'a dyn Previewer>,
    pub prefs: &'a Prefs,
}

/// Fetch summaries for `groups`, one remote fetch per mailbox.
///
/// A failed fetch skips its group and records a warning. Preview failures
/// leave that message with an empty preview.
pub fn fetch_overview(
    sources: &OverviewSources<'_>,
    groups: &[PositionGroup],
    opts: OverviewOptions,
    warnings: &mut Vec<IndexError>,
) -> Overview {
    let mut overview = Overview::default();
    let fields = FetchFields {
        headers: opts.headers,
        structure: opts.structure,
    };

    for group in groups {
        let ids: Vec<Uid> = group.ids.iter().map(|(uid, _)| uid.clone()).collect();
        let positions: HashMap<&Uid, usize> = group.ids.iter().map(|(u, p)| (u, *p)).collect();

        let fetched = match sources.store.fetch(&group.mailbox, &ids, fields) {
            Ok(f) => f,
            Err(cause) => {
                warn!(mailbox = %group.mailbox, error = %cause, "overview fetch failed");
                warnings.push(IndexError::Fetch {
                    mailbox: group.mailbox.clone(),
                    cause,
                });
                continue;
            }
        };

        let mut summaries: Vec<MessageSummary> = fetched
            .into_iter()
            .filter_map(|msg| {
                let position = *positions.get(&msg.uid)?;
                Some(MessageSummary {
                    mailbox: group.mailbox.clone(),
                    uid: msg.uid,
                    position,
                    envelope: msg.envelope,
                    flags: msg.flags,
                    size: msg.size,
                    headers: msg.headers,
                    structure: msg.structure,
                    preview: None,
                })
            })
            .collect();

        if opts.preview != PreviewMode::Off {
            attach_previews(sources, &group.mailbox, &mut summaries, opts.preview, warnings);
        }

        for summary in &summaries {
            overview.uids.insert(summary.mailbox.clone(), summary.uid.clone());
        }
        overview.messages.extend(summaries);
    }

    overview.messages.sort_by_key(|m| m.position);
    overview
}

fn wants_preview(mode: PreviewMode, prefs: &Prefs, summary: &MessageSummary) -> bool {
    match mode {
        PreviewMode::Off => false,
        PreviewMode::Force => true,
        PreviewMode::Prefs => !prefs.preview_show_unread || !summary.is_seen(),
    }
}

fn attach_previews(
    sources: &OverviewSources<'_>,
    mailbox: &str,
    summaries: &mut [MessageSummary],
    mode: PreviewMode,
    warnings: &mut Vec<IndexError>,
) {
    let wanted: Vec<Uid> = summaries
        .iter()
        .filter(|m| wants_preview(mode, sources.prefs, m))
        .map(|m| m.uid.clone())
        .collect();
    if wanted.is_empty() {
        return;
    }

    let mut cached = match sources.previews.map(|c| c.get(mailbox, &wanted)) {
        Some(Ok(hits)) => hits,
        Some(Err(cause)) => {
            warn!(mailbox, error = %cause, "preview cache read failed");
            warnings.push(IndexError::PreviewCache {
                mailbox: mailbox.to_string(),
                cause,
            });
            HashMap::new()
        }
        None => HashMap::new(),
    };

    let mut computed = HashMap::new();
    for summary in summaries.iter_mut() {
        if !wanted.contains(&summary.uid) {
            continue;
        }
        if let Some(hit) = cached.remove(&summary.uid) {
            summary.preview = Some(hit);
            continue;
        }

        let preview = match sources.previewer {
            Some(previewer) => match previewer.preview(sources.store, mailbox, &summary.uid) {
                Ok(p) => {
                    computed.insert(summary.uid.clone(), p.clone());
                    p
                }
                Err(e) => {
                    debug!(mailbox, uid = %summary.uid, error = %e, "preview failed");
                    Preview::default()
                }
            },
            None => Preview::default(),
        };
        summary.preview = Some(preview);
    }

    if computed.is_empty() {
        return;
    }
    if let Some(cache) = sources.previews {
        if let Err(err) = store_previews(sources.store, cache, mailbox, computed) {
            warn!(mailbox, error = %err, "preview cache write failed");
            warnings.push(err);
        }
    }
}

fn store_previews(
    store: &dyn RemoteStore,
    cache: &dyn PreviewCache,
    mailbox: &str,
    previews: HashMap<Uid, Preview>,
) -> Result<(), IndexError> {
    let status = store
        .status(mailbox, &[StatusItem::UidValidity])
        .map_err(|cause| IndexError::Status {
            mailbox: mailbox.to_string(),
            cause,
        })?;
    cache
        .set(mailbox, previews, status.uid_validity.unwrap_or(0))
        .map_err(|cause| IndexError::PreviewCache {
            mailbox: mailbox.to_string(),
            cause,
        })
}
