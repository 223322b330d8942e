//! Page loader.
//!
//! A load runs two count queries (active statuses, completed statuses) and
//! then the page for the visible tab. Every load takes a [`FetchTicket`]
//! first; once a newer ticket exists the older load writes nothing. The
//! final check happens under the board write lock so a superseded load can
//! never interleave with the commit of a newer one.

use std::sync::Arc;

use kds_orders::{department_selection, FetchCancelled, ListFilters};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::backend::OrderBackend;
use crate::board::OrderBoard;
use crate::notice::{Notice, NoticeBus};
use crate::sequencer::{FetchSequencer, FetchTicket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    #[default]
    Active,
    Completed,
}

/// Pagination and tab counts as of the last committed load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageState {
    pub tab: Tab,
    pub current_page: u32,
    pub total_pages: u32,
    pub active_count: u64,
    pub completed_count: u64,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            tab: Tab::Active,
            current_page: 1,
            total_pages: 1,
            active_count: 0,
            completed_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Committed(PageState),
    /// A newer load started; nothing was written.
    Superseded,
    /// The token fired (teardown); nothing was written.
    Cancelled,
    /// The page read failed upstream; board untouched.
    Failed(String),
}

/// `max(1, ceil(count / size))`.
pub fn total_pages(count: u64, page_size: u32) -> u32 {
    let size = u64::from(page_size.max(1));
    let pages = count.div_ceil(size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

pub struct PageLoader {
    backend: Arc<dyn OrderBackend>,
    board: Arc<RwLock<OrderBoard>>,
    sequencer: FetchSequencer,
    bus: NoticeBus,
    page_size: u32,
    state: RwLock<PageState>,
}

impl PageLoader {
    pub fn new(
        backend: Arc<dyn OrderBackend>,
        board: Arc<RwLock<OrderBoard>>,
        bus: NoticeBus,
        page_size: u32,
    ) -> Self {
        Self {
            backend,
            board,
            sequencer: FetchSequencer::new(),
            bus,
            page_size: page_size.max(1),
            state: RwLock::new(PageState::default()),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sequencer(&self) -> &FetchSequencer {
        &self.sequencer
    }

    pub async fn state(&self) -> PageState {
        self.state.read().await.clone()
    }

    /// Abort whatever is in flight. Used on teardown.
    pub fn shutdown(&self) {
        self.sequencer.cancel_all();
    }

    /// Load `page` of `tab` restricted to `departments` (`["All"]` or empty
    /// means unfiltered). Supersedes any load still in flight.
    pub async fn load<S: AsRef<str>>(&self, tab: Tab, page: u32, departments: &[S]) -> LoadOutcome {
        let ticket = self.sequencer.begin();
        match self.run(&ticket, tab, page, &department_selection(departments)).await {
            Ok(outcome) => outcome,
            Err(FetchCancelled) if !self.sequencer.is_current(&ticket) => {
                debug!(ticket = ticket.id(), "load superseded mid-request");
                LoadOutcome::Superseded
            }
            Err(FetchCancelled) => LoadOutcome::Cancelled,
        }
    }

    async fn run(
        &self,
        ticket: &FetchTicket,
        tab: Tab,
        page: u32,
        departments: &str,
    ) -> Result<LoadOutcome, FetchCancelled> {
        let cancel = Some(ticket.token());
        let active_filters = ListFilters::active(departments);
        let completed_filters = ListFilters::completed(departments);

        let active_count = self.backend.count_orders(&active_filters, cancel).await?;
        let completed_count = self.backend.count_orders(&completed_filters, cancel).await?;
        if !self.sequencer.is_current(ticket) {
            return Ok(LoadOutcome::Superseded);
        }

        let (filters, count) = match tab {
            Tab::Active => (&active_filters, active_count),
            Tab::Completed => (&completed_filters, completed_count),
        };
        let fetched = self
            .backend
            .list_orders(page.max(1), self.page_size, filters, cancel)
            .await?;

        let mut board = self.board.write().await;
        if !self.sequencer.is_current(ticket) {
            return Ok(LoadOutcome::Superseded);
        }
        if !fetched.ok {
            drop(board);
            let message = fetched
                .error
                .unwrap_or_else(|| "Failed to load orders from API".to_string());
            warn!(ticket = ticket.id(), ?tab, page, error = %message, "page load failed");
            self.bus.publish(Notice::Failure {
                order_id: None,
                message: message.clone(),
            });
            return Ok(LoadOutcome::Failed(message));
        }

        match tab {
            Tab::Active => {
                board.active = fetched.items;
                board.completed.clear();
            }
            Tab::Completed => {
                board.completed = fetched.items;
                board.active.clear();
            }
        }

        let total_pages = total_pages(count, self.page_size);
        let state = PageState {
            tab,
            current_page: page.clamp(1, total_pages),
            total_pages,
            active_count,
            completed_count,
        };
        *self.state.write().await = state.clone();
        drop(board);

        debug!(
            ticket = ticket.id(),
            ?tab,
            page = state.current_page,
            total_pages,
            active_count,
            completed_count,
            "page committed"
        );
        Ok(LoadOutcome::Committed(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_never_below_one() {
        assert_eq!(total_pages(0, 24), 1);
        assert_eq!(total_pages(24, 24), 1);
        assert_eq!(total_pages(25, 24), 2);
        assert_eq!(total_pages(7, 0), 7);
    }

    #[test]
    fn default_state_is_first_active_page() {
        let s = PageState::default();
        assert_eq!(s.tab, Tab::Active);
        assert_eq!((s.current_page, s.total_pages), (1, 1));
    }
}
