//! Ordered message index for one mailbox.
//!
//! The index is built lazily from the remote store, persisted between
//! requests through the session cache, and keeps a cursor on the "current"
//! message for next/previous navigation. Saved searches ("virtual"
//! mailboxes) keep the origin mailbox of every entry alongside its UID,
//! since UIDs are only unique within one physical mailbox.

use tracing::{debug, warn};
use uuid::Uuid;

use super::cache::{SessionCache, SessionStore};
use super::overview::{Overview, OverviewOptions, OverviewSources, fetch_overview, resolve_positions};
use super::pager::{MailboxPage, PageInput, compute_page};
use super::preview::{MessagePreviewer, PreviewCache, Previewer};
use super::threading::ThreadTree;
use super::types::{Entry, Indices, SortedList};
use crate::config::{MailboxStart, Prefs};
use crate::error::{IndexError, Result};
use crate::remote::{
    Flag, RemoteStore, SavedSearches, SearchQuery, SearchResult, SearchResults, SortKey,
    StatusItem, Uid,
};

static EMPTY_TREE: ThreadTree = ThreadTree::empty();

/// Collaborators shared by every index opened during a request.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    store: &'a dyn RemoteStore,
    searches: &'a dyn SavedSearches,
    session: &'a dyn SessionStore,
    prefs: &'a Prefs,
    previews: Option<&'a dyn PreviewCache>,
    previewer: Option<&'a dyn Previewer>,
}

impl<'a> Context<'a> {
    pub fn new(
        store: &'a dyn RemoteStore,
        searches: &'a dyn SavedSearches,
        session: &'a dyn SessionStore,
        prefs: &'a Prefs,
    ) -> Self {
        Self {
            store,
            searches,
            session,
            prefs,
            previews: None,
            previewer: None,
        }
    }

    pub fn with_preview_cache(mut self, cache: &'a dyn PreviewCache) -> Self {
        self.previews = Some(cache);
        self
    }

    /// Defaults to a `MessagePreviewer` sized by the preview preferences.
    pub fn with_previewer(mut self, previewer: &'a dyn Previewer) -> Self {
        self.previewer = Some(previewer);
        self
    }

    pub fn prefs(&self) -> &'a Prefs {
        self.prefs
    }

    fn session_cache(&self) -> SessionCache<'a> {
        SessionCache::new(self.session, self.prefs.protocol)
    }
}

/// What to drop from the index after messages were deleted or moved away.
#[derive(Debug, Clone)]
pub enum Removal {
    /// Too much changed to patch the list; rebuild it.
    All,
    Messages(Indices),
}

enum FlagSearch {
    Recent,
    Unseen,
}

pub struct MailboxIndex<'a> {
    ctx: Context<'a>,
    name: String,
    search: bool,
    /// `None` until built.
    sorted: Option<Vec<Uid>>,
    /// Parallel to `sorted` for saved searches, empty otherwise.
    origins: Vec<String>,
    cursor: Option<usize>,
    /// `sorted` differs from the persisted record.
    dirty: bool,
    thread: Option<ThreadTree>,
    warnings: Vec<IndexError>,
}

impl<'a> MailboxIndex<'a> {
    /// Open the index for `name`.
    ///
    /// Without a seed the listing starts from a fresh build, so any persisted
    /// record is dropped. With a seed the persisted record is loaded and the
    /// cursor placed on the seed message.
    pub fn open(name: impl Into<String>, ctx: Context<'a>, seed: Option<&Entry>) -> Self {
        let name = name.into();
        let search = ctx.searches.is_search_mailbox(&name);

        let mut index = Self {
            ctx,
            name,
            search,
            sorted: None,
            origins: Vec::new(),
            cursor: None,
            dirty: false,
            thread: None,
            warnings: Vec::new(),
        };

        let cache = ctx.session_cache();
        match seed {
            None => {
                if let Err(cause) = cache.forget(&index.name) {
                    index.degrade_session(cause);
                }
            }
            Some(entry) => {
                match cache.load(&index.name, search) {
                    Ok(Some(list)) => {
                        debug!(mailbox = %index.name, count = list.uids.len(), "index restored from session");
                        index.sorted = Some(list.uids);
                        index.origins = list.mailboxes;
                    }
                    Ok(None) => {}
                    Err(cause) => index.degrade_session(cause),
                }
                index.set_cursor(&entry.uid, Some(entry.mailbox.as_str()));
            }
        }

        index
    }

    /// Open, run `f`, then flush whatever `f` left dirty.
    ///
    /// The flush also runs when `f` returns an error value or unwinds.
    /// Flush failures are logged.
    pub fn scoped<R>(
        name: impl Into<String>,
        ctx: Context<'a>,
        seed: Option<&Entry>,
        f: impl FnOnce(&mut MailboxIndex<'a>) -> R,
    ) -> R {
        struct FlushOnDrop<'i, 'a>(&'i mut MailboxIndex<'a>);

        impl Drop for FlushOnDrop<'_, '_> {
            fn drop(&mut self) {
                if let Err(e) = self.0.flush() {
                    warn!(mailbox = %self.0.name, error = %e, "index flush failed");
                }
            }
        }

        let mut index = Self::open(name, ctx, seed);
        let mut guard = FlushOnDrop(&mut index);
        f(&mut *guard.0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a saved search rather than a physical mailbox.
    pub fn is_search(&self) -> bool {
        self.search
    }

    pub fn is_built(&self) -> bool {
        self.sorted.is_some()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Conditions recorded since the last call, oldest first.
    pub fn take_warnings(&mut self) -> Vec<IndexError> {
        std::mem::take(&mut self.warnings)
    }

    pub fn warnings(&self) -> &[IndexError] {
        &self.warnings
    }

    fn len(&self) -> usize {
        self.sorted.as_ref().map_or(0, Vec::len)
    }

    fn degrade(&mut self, err: IndexError) {
        warn!(mailbox = %self.name, error = %err, "degraded");
        self.warnings.push(err);
    }

    fn degrade_session(&mut self, cause: anyhow::Error) {
        let mailbox = self.name.clone();
        self.degrade(IndexError::Session { mailbox, cause });
    }

    /// Populate the list if it has not been built yet.
    ///
    /// A failed remote call leaves an empty, built list; it is not retried
    /// until something forces a rebuild.
    pub fn build(&mut self) {
        if self.sorted.is_some() {
            return;
        }

        let prefs = self.ctx.prefs;
        let filter = prefs
            .hide_deleted_in(&self.name)
            .then(SearchQuery::undeleted);
        let mut origins = Vec::new();

        let uids = if self.search {
            match self.ctx.searches.run(&self.name, filter.as_ref()) {
                Ok(hits) => {
                    let (mailboxes, uids): (Vec<String>, Vec<Uid>) = hits.into_iter().unzip();
                    origins = mailboxes;
                    uids
                }
                Err(cause) => {
                    let mailbox = self.name.clone();
                    self.degrade(IndexError::Listing { mailbox, cause });
                    Vec::new()
                }
            }
        } else {
            let sort = prefs.sort_for(&self.name);
            if sort.by == SortKey::Thread {
                self.thread_tree().message_list(sort.dir.is_descending())
            } else {
                match self.ctx.store.sort(
                    &self.name,
                    filter.as_ref(),
                    sort.by,
                    sort.dir.is_descending(),
                ) {
                    Ok(uids) => uids,
                    Err(cause) => {
                        let mailbox = self.name.clone();
                        self.degrade(IndexError::Listing { mailbox, cause });
                        Vec::new()
                    }
                }
            }
        };

        debug!(mailbox = %self.name, count = uids.len(), search = self.search, "index built");
        self.sorted = Some(uids);
        self.origins = origins;
        self.dirty = true;
    }

    /// Discard the list and the thread ordering, then build again.
    pub fn force_rebuild(&mut self) {
        self.sorted = None;
        self.origins.clear();
        self.thread = None;
        self.build();

        if self.cursor.is_some_and(|c| c >= self.len()) {
            self.cursor = None;
        }
    }

    /// Rebuild when forced, or when the cursor sits on the last entry.
    ///
    /// Only the cursor's successor is probed, so changes elsewhere in the
    /// mailbox can go unnoticed until the next full rebuild.
    pub fn maybe_rebuild(&mut self, force: bool) {
        if force || (self.cursor.is_some() && self.current_entry(1).is_none()) {
            self.force_rebuild();
        }
    }

    /// Place the cursor on a message. `mailbox` selects the origin in a saved
    /// search and is ignored otherwise.
    pub fn set_cursor(&mut self, uid: &Uid, mailbox: Option<&str>) {
        self.cursor = self.array_index(uid, mailbox);
        if self.cursor.is_none() {
            self.force_rebuild();
            self.cursor = self.position_of(uid, mailbox);
        }
    }

    /// Move the cursor by `delta`, unsetting it when it leaves the list.
    pub fn advance_cursor(&mut self, delta: isize) {
        if let Some(cursor) = self.cursor {
            let len = self.len();
            self.cursor = cursor.checked_add_signed(delta).filter(|&p| p < len);
            self.maybe_rebuild(false);
        }
    }

    /// Entry `offset` positions away from the cursor.
    pub fn current_entry(&self, offset: isize) -> Option<Entry> {
        let pos = self.cursor?.checked_add_signed(offset)?;
        let uid = self.sorted.as_ref()?.get(pos)?.clone();
        let mailbox = if self.search {
            self.origins.get(pos)?.clone()
        } else {
            self.name.clone()
        };
        Some(Entry { mailbox, uid })
    }

    /// 1-based position of the cursor, 1 when unset.
    pub fn display_position(&self) -> usize {
        self.cursor.map_or(1, |c| c + 1)
    }

    /// Position of a message in the list.
    pub fn array_index(&mut self, uid: &Uid, mailbox: Option<&str>) -> Option<usize> {
        self.build();
        self.position_of(uid, mailbox)
    }

    fn position_of(&self, uid: &Uid, mailbox: Option<&str>) -> Option<usize> {
        let sorted = self.sorted.as_ref()?;
        if self.search {
            let mailbox = mailbox.unwrap_or(&self.name);
            sorted
                .iter()
                .zip(&self.origins)
                .position(|(u, m)| u == uid && m == mailbox)
        } else {
            sorted.iter().position(|u| u == uid)
        }
    }

    /// Whether the cursor points at a message, optionally re-checking it
    /// against the remote store first.
    pub fn is_valid_index(&mut self, rebuild: bool) -> bool {
        if rebuild {
            self.maybe_rebuild(false);
            self.advance_cursor(0);
        }
        self.cursor.is_some()
    }

    pub fn message_count(&mut self) -> usize {
        self.build();
        self.len()
    }

    pub fn sorted_list(&mut self) -> SortedList {
        self.build();
        let uids = self
            .sorted
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, uid)| (i + 1, uid.clone()))
            .collect();
        let mailboxes = self
            .origins
            .iter()
            .enumerate()
            .map(|(i, m)| (i + 1, m.clone()))
            .collect();
        SortedList { uids, mailboxes }
    }

    /// Drop messages that were deleted or moved away.
    ///
    /// The cursor keeps pointing at the same message, or at the one that
    /// followed it when the current message itself was removed.
    pub fn remove_messages(&mut self, removal: Removal) {
        let indices = match removal {
            Removal::All => {
                self.maybe_rebuild(true);
                return;
            }
            Removal::Messages(indices) => indices,
        };
        if indices.is_empty() {
            return;
        }

        self.build();
        let mut removed: Vec<usize> = indices
            .iter()
            .filter_map(|entry| self.position_of(&entry.uid, Some(entry.mailbox.as_str())))
            .collect();
        removed.sort_unstable();
        removed.dedup();
        if removed.is_empty() {
            return;
        }

        if let Some(cursor) = self.cursor {
            let before = removed.iter().filter(|&&p| p < cursor).count();
            self.cursor = Some(cursor - before);
        }

        if let Some(sorted) = self.sorted.as_mut() {
            for &pos in removed.iter().rev() {
                sorted.remove(pos);
                if self.search {
                    self.origins.remove(pos);
                }
            }
        }
        debug!(mailbox = %self.name, removed = removed.len(), "entries removed");

        self.thread = None;
        self.dirty = true;
        self.advance_cursor(0);
    }

    /// Fingerprint of the mailbox state and sort order.
    ///
    /// Saved searches have no server-side fingerprint and get a fresh token
    /// on every call.
    pub fn cache_id(&mut self) -> String {
        if !self.search {
            let items = [
                StatusItem::Messages,
                StatusItem::UidNext,
                StatusItem::UidValidity,
                StatusItem::HighestModSeq,
            ];
            match self.ctx.store.status(&self.name, &items) {
                Ok(status) => {
                    let sort = self.ctx.prefs.sort_for(&self.name);
                    return format!(
                        "{}|{}|{}|{}|{}{}",
                        status.uid_validity.unwrap_or(0),
                        status.messages.unwrap_or(0),
                        status.uid_next.unwrap_or(0),
                        status.highest_modseq.unwrap_or(0),
                        sort.by.as_str(),
                        if sort.dir.is_descending() { "-" } else { "+" },
                    );
                }
                Err(cause) => {
                    let mailbox = self.name.clone();
                    self.degrade(IndexError::Status { mailbox, cause });
                }
            }
        }
        unique_token()
    }

    /// Thread ordering of the mailbox, fetched on first use.
    ///
    /// A failed request returns an empty ordering that is not kept.
    pub fn thread_tree(&mut self) -> &ThreadTree {
        if self.search {
            return &EMPTY_TREE;
        }
        if self.thread.is_none() {
            match self
                .ctx
                .store
                .thread(&self.name, self.ctx.prefs.thread_criteria)
            {
                Ok(tree) => self.thread = Some(tree),
                Err(cause) => {
                    let mailbox = self.name.clone();
                    self.degrade(IndexError::Thread { mailbox, cause });
                    return &EMPTY_TREE;
                }
            }
        }
        self.thread.as_ref().unwrap_or(&EMPTY_TREE)
    }

    /// Recent messages.
    pub fn new_messages(&mut self, results: SearchResults, by_uid: bool) -> SearchResult {
        self.flag_search(FlagSearch::Recent, results, by_uid)
    }

    /// Unseen messages.
    pub fn unseen_messages(&mut self, results: SearchResults, by_uid: bool) -> SearchResult {
        self.flag_search(FlagSearch::Unseen, results, by_uid)
    }

    fn flag_search(&mut self, kind: FlagSearch, results: SearchResults, by_uid: bool) -> SearchResult {
        if self.search {
            return SearchResult::default();
        }
        self.build();
        if self.len() == 0 {
            return SearchResult::default();
        }

        let prefs = self.ctx.prefs;
        let mut query = SearchQuery::new();
        if prefs.hide_deleted_in(&self.name) {
            query = query.flag(Flag::Deleted, false);
        } else if results == SearchResults::Count {
            // Deleted messages count too, so the status answer is exact
            let item = match kind {
                FlagSearch::Recent => StatusItem::Recent,
                FlagSearch::Unseen => StatusItem::Unseen,
            };
            return match self.ctx.store.status(&self.name, &[item]) {
                Ok(status) => {
                    let count = match kind {
                        FlagSearch::Recent => status.recent,
                        FlagSearch::Unseen => status.unseen,
                    };
                    SearchResult {
                        count: count.unwrap_or(0) as usize,
                        ..Default::default()
                    }
                }
                Err(cause) => {
                    let mailbox = self.name.clone();
                    self.degrade(IndexError::Status { mailbox, cause });
                    SearchResult::default()
                }
            };
        }

        query = match kind {
            FlagSearch::Recent => query.flag(Flag::Recent, true),
            FlagSearch::Unseen => query.flag(Flag::Seen, false),
        };

        match self.ctx.store.search(&self.name, &query, results, !by_uid) {
            Ok(result) => result,
            Err(cause) => {
                let mailbox = self.name.clone();
                self.degrade(IndexError::Search { mailbox, cause });
                SearchResult::default()
            }
        }
    }

    /// 1-based position a listing should open at, per the start preference.
    pub fn mailbox_start(&mut self, total: usize) -> usize {
        if self.search {
            return 1;
        }

        match self.ctx.prefs.mailbox_start {
            MailboxStart::FirstPage => 1,
            MailboxStart::LastPage => total,
            MailboxStart::FirstUnseen => {
                if self.ctx.prefs.sort_for(&self.name).by == SortKey::Sequence {
                    match self.ctx.store.status(&self.name, &[StatusItem::FirstUnseen]) {
                        Ok(status) => status.first_unseen.map_or(1, |n| n as usize),
                        Err(cause) => {
                            let mailbox = self.name.clone();
                            self.degrade(IndexError::Status { mailbox, cause });
                            1
                        }
                    }
                } else {
                    let found = self.unseen_messages(SearchResults::Min, true).min;
                    self.start_at(found)
                }
            }
            MailboxStart::LastUnseen => {
                let found = self.unseen_messages(SearchResults::Max, true).max;
                self.start_at(found)
            }
        }
    }

    fn start_at(&mut self, uid: Option<Uid>) -> usize {
        uid.and_then(|uid| self.array_index(&uid, None))
            .map_or(1, |i| i + 1)
    }

    /// Work out the page to list and remember it for the session.
    pub fn build_page(&mut self, page: Option<usize>, start: Option<usize>) -> MailboxPage {
        self.build();
        let total = self.len();
        let cache = self.ctx.session_cache();

        let remembered = match cache.remembered_page(&self.name) {
            Ok(p) => p,
            Err(cause) => {
                self.degrade_session(cause);
                None
            }
        };

        let input = PageInput {
            page,
            start,
            page_size: self.ctx.prefs.page_size,
            total,
            remembered,
            is_search: self.search,
        };
        let bounds = compute_page(&input, |total| self.mailbox_start(total));

        let anymsg = if total == 0 && !self.search {
            match self.ctx.store.status(&self.name, &[StatusItem::Messages]) {
                Ok(status) => status.messages.unwrap_or(0) > 0,
                Err(cause) => {
                    let mailbox = self.name.clone();
                    self.degrade(IndexError::Status { mailbox, cause });
                    false
                }
            }
        } else {
            true
        };

        if let Err(cause) = cache.remember_page(&self.name, bounds.page) {
            self.degrade_session(cause);
        }

        MailboxPage {
            anymsg,
            begin: bounds.begin,
            end: bounds.end,
            index: if self.search {
                Some(bounds.begin - 1)
            } else {
                self.cursor
            },
            msgcount: total,
            page: bounds.page,
            page_count: bounds.page_count,
        }
    }

    /// Summaries for 1-based display positions, fetched one batch per
    /// origin mailbox. Positions past the end are skipped.
    pub fn mailbox_array(&mut self, positions: &[usize], opts: OverviewOptions) -> Overview {
        self.build();
        let groups = resolve_positions(
            positions,
            self.sorted.as_deref().unwrap_or(&[]),
            &self.origins,
            &self.name,
        );

        let fallback = MessagePreviewer::new(self.ctx.prefs.preview_max_len);
        let sources = OverviewSources {
            store: self.ctx.store,
            previews: self.ctx.previews,
            previewer: Some(self.ctx.previewer.unwrap_or(&fallback)),
            prefs: self.ctx.prefs,
        };
        fetch_overview(&sources, &groups, opts, &mut self.warnings)
    }

    /// Run an ad-hoc query against this mailbox, or through the saved
    /// search for a virtual one.
    pub fn run_search_query(&mut self, query: &SearchQuery) -> Result<Indices> {
        if self.search {
            let hits = self
                .ctx
                .searches
                .run(&self.name, Some(query))
                .map_err(|cause| IndexError::Search {
                    mailbox: self.name.clone(),
                    cause,
                })?;
            return Ok(hits
                .into_iter()
                .map(|(mailbox, uid)| Entry { mailbox, uid })
                .collect());
        }

        let result = self
            .ctx
            .store
            .search(&self.name, query, SearchResults::Match, false)
            .map_err(|cause| IndexError::Search {
                mailbox: self.name.clone(),
                cause,
            })?;
        Ok(result
            .matches
            .into_iter()
            .map(|uid| Entry::new(self.name.as_str(), uid))
            .collect())
    }

    /// Persist the list if it changed and the view keeps indexes between
    /// requests.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty || !self.ctx.prefs.persists_index() {
            return Ok(());
        }
        let Some(sorted) = self.sorted.as_ref() else {
            return Ok(());
        };

        self.ctx
            .session_cache()
            .store(&self.name, sorted, &self.origins)
            .map_err(|cause| IndexError::Session {
                mailbox: self.name.clone(),
                cause,
            })?;
        self.dirty = false;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}

/// Random token, so a saved search never reuses a cached listing.
fn unique_token() -> String {
    Uuid::new_v4().to_string()
}
