use strum::IntoEnumIterator;
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;

use crate::catalog::{page_count, CatalogPage};
use crate::deck::{Category, Entry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Browse,
    Deck,
}

/// Identifies one page request; completions carrying an older ticket are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
    seq: u64,
    page: u32,
}

impl PageTicket {
    pub fn page(&self) -> u32 {
        self.page
    }
}

#[derive(Debug, Clone, Default)]
pub struct BrowseState {
    pub page: u32,
    pub entries: Vec<Entry>,
    pub total_count: Option<u64>,
    pub loading: bool,
    pub error: Option<String>,
    pub selected: usize,
    request_seq: u64,
}

impl BrowseState {
    pub fn new() -> Self {
        Self {
            page: 1,
            ..Self::default()
        }
    }

    pub fn page_count(&self) -> Option<u32> {
        self.total_count.map(page_count)
    }

    pub fn can_go_previous(&self) -> bool {
        !self.loading && self.page > 1
    }

    pub fn can_go_next(&self) -> bool {
        !self.loading
            && self
                .page_count()
                .is_some_and(|pages| self.page < pages)
    }

    pub fn begin_request(&mut self, page: u32) -> PageTicket {
        self.request_seq += 1;
        self.loading = true;
        self.error = None;
        PageTicket {
            seq: self.request_seq,
            page: page.max(1),
        }
    }

    /// Applies a finished page request. On failure the previously shown page
    /// stays in place. Returns false when the ticket was superseded.
    pub fn complete(&mut self, ticket: PageTicket, result: Result<CatalogPage, String>) -> bool {
        if ticket.seq != self.request_seq {
            tracing::debug!(page = ticket.page, "discarding superseded page result");
            return false;
        }
        self.loading = false;
        match result {
            Ok(page) => {
                self.page = page.page;
                self.total_count = Some(page.total_count);
                self.entries = page.entries;
                self.selected = 0;
                self.error = None;
            }
            Err(message) => {
                self.error = Some(message);
            }
        }
        true
    }

    pub fn selected_entry(&self) -> Option<&Entry> {
        self.entries.get(self.selected)
    }

    pub fn move_selection(&mut self, delta: isize) {
        self.selected = step(self.selected, self.entries.len(), delta);
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchInput {
    pub active: bool,
    pub buffer: String,
}

impl SearchInput {
    pub fn push(&mut self, ch: char) {
        if self.buffer.chars().count() < 64 {
            self.buffer.push(ch);
        }
    }

    /// Drops the last grapheme cluster.
    pub fn pop(&mut self) -> bool {
        let Some((idx, _)) = self.buffer.grapheme_indices(true).next_back() else {
            return false;
        };
        self.buffer.truncate(idx);
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeckPane {
    pub selected: usize,
    pub search: SearchInput,
}

impl DeckPane {
    pub fn move_selection(&mut self, len: usize, delta: isize) {
        self.selected = step(self.selected, len, delta);
    }

    pub fn clamp(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusLine {
    pub text: String,
    pub failure: bool,
    pub at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub view: View,
    pub browse: BrowseState,
    pub deck: DeckPane,
    pub status: Option<StatusLine>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            view: View::Browse,
            browse: BrowseState::new(),
            deck: DeckPane::default(),
            status: None,
        }
    }

    pub fn toggle_view(&mut self) {
        self.view = match self.view {
            View::Browse => View::Deck,
            View::Deck => View::Browse,
        };
    }

    pub fn is_search_active(&self) -> bool {
        self.view == View::Deck && self.deck.search.active
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status = message.map(|text| StatusLine {
            text: text.into(),
            failure: false,
            at: OffsetDateTime::now_utc(),
        });
    }

    pub fn set_failure<S: Into<String>>(&mut self, message: S) {
        self.status = Some(StatusLine {
            text: message.into(),
            failure: true,
            at: OffsetDateTime::now_utc(),
        });
    }

    pub fn clear_status_message(&mut self) {
        self.status = None;
    }
}

/// Next entry of the type filter selector: "all", then the vocabulary in order.
pub fn next_filter(current: Option<Category>) -> Option<Category> {
    match current {
        None => Category::iter().next(),
        Some(category) => Category::iter().skip_while(|c| *c != category).nth(1),
    }
}

fn step(current: usize, len: usize, delta: isize) -> usize {
    if len == 0 {
        return 0;
    }
    let next = current as isize + delta;
    next.clamp(0, len as isize - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::Attributes;

    fn page(number: u32, ids: &[i64], total: u64) -> CatalogPage {
        CatalogPage {
            page: number,
            entries: ids
                .iter()
                .map(|id| Entry::new(*id, format!("mon-{id}"), "", vec![], Attributes::default()))
                .collect(),
            total_count: total,
        }
    }

    #[test]
    fn paging_is_disabled_while_loading_and_at_the_edges() {
        let mut browse = BrowseState::new();
        assert!(!browse.can_go_previous());
        assert!(!browse.can_go_next(), "unknown total");

        let ticket = browse.begin_request(1);
        assert!(!browse.can_go_next());
        assert!(browse.complete(ticket, Ok(page(1, &[1, 2], 24))));
        assert!(!browse.can_go_previous());
        assert!(browse.can_go_next());

        let ticket = browse.begin_request(2);
        assert!(!browse.can_go_previous(), "loading");
        browse.complete(ticket, Ok(page(2, &[13], 24)));
        assert!(browse.can_go_previous());
        assert!(!browse.can_go_next(), "last page");
    }

    #[test]
    fn superseded_page_result_is_dropped() {
        let mut browse = BrowseState::new();
        let first = browse.begin_request(2);
        let second = browse.begin_request(3);
        assert!(browse.complete(second, Ok(page(3, &[25], 100))));
        assert!(!browse.complete(first, Ok(page(2, &[13], 100))));
        assert_eq!(browse.page, 3);
        assert_eq!(browse.entries[0].id, 25);
    }

    #[test]
    fn failed_page_keeps_previous_entries() {
        let mut browse = BrowseState::new();
        let ticket = browse.begin_request(1);
        browse.complete(ticket, Ok(page(1, &[1, 2, 3], 36)));

        let ticket = browse.begin_request(2);
        browse.complete(ticket, Err("catalog unreachable".into()));
        assert_eq!(browse.page, 1);
        assert_eq!(browse.entries.len(), 3);
        assert_eq!(browse.error.as_deref(), Some("catalog unreachable"));
        assert!(!browse.loading);
    }

    #[test]
    fn filter_selector_cycles_through_all_and_vocabulary() {
        let mut current = None;
        let mut seen = 0;
        loop {
            current = next_filter(current);
            seen += 1;
            if current.is_none() {
                break;
            }
        }
        assert_eq!(seen, 19);
        assert_eq!(next_filter(None), Some(Category::Normal));
        assert_eq!(next_filter(Some(Category::Fairy)), None);
    }

    #[test]
    fn search_backspace_removes_whole_graphemes() {
        let mut input = SearchInput::default();
        for ch in "e\u{301}x".chars() {
            input.push(ch);
        }
        assert!(input.pop());
        assert_eq!(input.buffer, "e\u{301}");
        assert!(input.pop());
        assert!(input.buffer.is_empty());
        assert!(!input.pop());
    }

    #[test]
    fn selection_clamps_to_bounds() {
        let mut pane = DeckPane::default();
        pane.move_selection(3, 5);
        assert_eq!(pane.selected, 2);
        pane.clamp(1);
        assert_eq!(pane.selected, 0);
        pane.move_selection(0, 1);
        assert_eq!(pane.selected, 0);
    }
}
