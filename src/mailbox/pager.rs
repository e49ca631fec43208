/// Everything page resolution depends on besides the start policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageInput {
    /// Explicit page number; 0 counts as absent.
    pub page: Option<usize>,
    /// 1-based message position to show (set when returning from a message).
    pub start: Option<usize>,
    /// 0 means unlimited.
    pub page_size: usize,
    pub total: usize,
    /// Page last shown for this mailbox in the session.
    pub remembered: Option<usize>,
    pub is_search: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    /// 1-based position of the first message on the page.
    pub begin: usize,
    /// 1-based position of the last message; `begin - 1` on an empty list.
    pub end: usize,
    pub page: usize,
    pub page_count: usize,
}

/// Result of building a listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxPage {
    /// False only when the mailbox is truly empty, as opposed to every
    /// message being hidden.
    pub anymsg: bool,
    pub begin: usize,
    pub end: usize,
    /// Current cursor; for saved searches the 0-based start of the page.
    pub index: Option<usize>,
    pub msgcount: usize,
    pub page: usize,
    pub page_count: usize,
}

/// Resolve the page to show.
///
/// Precedence: explicit page, then start position, then the remembered page,
/// then page 1 for saved searches, then `start_offset(total)` (the user's
/// start policy). Only asks for the start offset when it is needed, since it
/// may cost a remote round trip.
pub fn compute_page(input: &PageInput, start_offset: impl FnOnce(usize) -> usize) -> PageBounds {
    let total = input.total;
    let page_size = input.page_size;

    if page_size == 0 || total <= page_size {
        return PageBounds {
            begin: 1,
            end: total,
            page: 1,
            page_count: 1,
        };
    }

    let page_count = total.div_ceil(page_size);

    let page = match (input.page.filter(|&p| p > 0), input.start.filter(|&s| s > 0)) {
        (Some(page), _) => page,
        (None, Some(start)) => start.div_ceil(page_size),
        (None, None) => match input.remembered {
            Some(page) => page,
            None if input.is_search => 1,
            None => start_offset(total).div_ceil(page_size),
        },
    };
    let page = page.clamp(1, page_count);

    let begin = (page - 1) * page_size + 1;
    let end = (begin + page_size - 1).min(total);

    PageBounds {
        begin,
        end,
        page,
        page_count,
    }
}
