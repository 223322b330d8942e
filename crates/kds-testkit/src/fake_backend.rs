//! In-memory upstream used ONLY by tests.
//!
//! Holds the "server-side" orders. Accepted status batches are applied to
//! them the way the real upstream would, so a later verify or page load sees
//! the new statuses. Failure injection, call holds and submit latency let
//! scenarios drive races and rollbacks deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kds_client::CancellationToken;
use kds_orders::{FetchCancelled, ListFilters, MutationResult, OrderPage};
use kds_reconcile::{evaluate_order, ReconciliationResult};
use kds_runtime::OrderBackend;
use kds_schemas::{derive_ui_status, Order, StatusChangeRow};
use tokio::sync::oneshot;

/// What `submit_status` does with the next batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitMode {
    /// Accept and apply to the stored orders.
    Apply,
    /// Accept, but leave the stored orders unchanged.
    AcceptWithoutApplying,
    /// Reject with this business code and message.
    Reject { code: String, message: String },
}

/// Handle for one held backend call.
pub struct CallHold {
    entered: Option<oneshot::Receiver<()>>,
    release: Option<oneshot::Sender<()>>,
}

impl CallHold {
    /// Resolves once the held call has started.
    pub async fn entered(&mut self) {
        if let Some(rx) = self.entered.take() {
            let _ = rx.await;
        }
    }

    pub fn release(mut self) {
        if let Some(tx) = self.release.take() {
            let _ = tx.send(());
        }
    }
}

struct HeldCall {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

#[derive(Default)]
struct State {
    orders: Vec<Order>,
    submitted: Vec<Vec<StatusChangeRow>>,
    list_calls: Vec<ListFilters>,
    list_holds: VecDeque<HeldCall>,
    submit_holds: VecDeque<HeldCall>,
    page_error: Option<String>,
}

pub struct FakeBackend {
    state: Mutex<State>,
    mode: Mutex<SubmitMode>,
    unreadable: Mutex<bool>,
    honor_cancel: Mutex<bool>,
    submit_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FakeBackend {
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            state: Mutex::new(State {
                orders,
                ..State::default()
            }),
            mode: Mutex::new(SubmitMode::Apply),
            unreadable: Mutex::new(false),
            honor_cancel: Mutex::new(true),
            submit_delay: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_submit_mode(&self, mode: SubmitMode) {
        *lock(&self.mode) = mode;
    }

    pub fn reject_submits(&self, code: &str, message: &str) {
        self.set_submit_mode(SubmitMode::Reject {
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    /// Verify reads return nothing (inconclusive).
    pub fn set_unreadable(&self, yes: bool) {
        *lock(&self.unreadable) = yes;
    }

    /// When false, held list calls ignore their cancellation token.
    pub fn set_honor_cancel(&self, yes: bool) {
        *lock(&self.honor_cancel) = yes;
    }

    pub fn set_submit_delay(&self, delay: Option<Duration>) {
        *lock(&self.submit_delay) = delay;
    }

    /// Page reads fail with this message until cleared.
    pub fn set_page_error(&self, error: Option<&str>) {
        self.lock_state().page_error = error.map(str::to_string);
    }

    /// The next `list_orders` call (in call order) blocks until released.
    pub fn hold_next_list(&self) -> CallHold {
        let (held, hold) = hold_pair();
        self.lock_state().list_holds.push_back(held);
        hold
    }

    /// The next `submit_status` call blocks until released.
    pub fn hold_next_submit(&self) -> CallHold {
        let (held, hold) = hold_pair();
        self.lock_state().submit_holds.push_back(held);
        hold
    }

    pub fn replace_orders(&self, orders: Vec<Order>) {
        self.lock_state().orders = orders;
    }

    pub fn order(&self, code: &str) -> Option<Order> {
        self.lock_state().orders.iter().find(|o| o.code() == code).cloned()
    }

    /// Every batch received, accepted or not.
    pub fn submitted(&self) -> Vec<Vec<StatusChangeRow>> {
        self.lock_state().submitted.clone()
    }

    /// Filters of every page (non-count) read.
    pub fn list_calls(&self) -> Vec<ListFilters> {
        self.lock_state().list_calls.clone()
    }

    /// Most submissions ever in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn matching(&self, filters: &ListFilters) -> Vec<Order> {
        self.lock_state()
            .orders
            .iter()
            .filter(|o| matches(o, filters))
            .cloned()
            .collect()
    }

    fn apply(&self, rows: &[StatusChangeRow]) {
        let mut st = self.lock_state();
        for row in rows {
            let Some(order) = st.orders.iter_mut().find(|o| o.code() == row.order_code) else {
                continue;
            };
            let status = row.status.as_str().to_string();
            if row.is_whole_order() {
                for l in &mut order.lines {
                    l.raw_status = status.clone();
                }
            } else if let Some(l) = order.lines.iter_mut().find(|l| l.line_id == row.line_id) {
                l.raw_status = status.clone();
            }
            order.system_status = status;
            order.status = derive_ui_status(&order.lines, &order.system_status);
            order.cooking = order.lines.iter().any(|l| l.is_inproc());
        }
    }
}

#[async_trait::async_trait]
impl OrderBackend for FakeBackend {
    async fn submit_status(&self, rows: &[StatusChangeRow]) -> MutationResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let held = self.lock_state().submit_holds.pop_front();
        if let Some(call) = held {
            let _ = call.entered.send(());
            let _ = call.release.await;
        }
        let delay = *lock(&self.submit_delay);
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        self.lock_state().submitted.push(rows.to_vec());
        let mode = lock(&self.mode).clone();
        let result = match mode {
            SubmitMode::Reject { code, message } => MutationResult {
                ok: false,
                skipped: false,
                rows_sent: rows.len(),
                attempts: 1,
                code: Some(code),
                error: Some(message),
            },
            accept => {
                if accept == SubmitMode::Apply {
                    self.apply(rows);
                }
                MutationResult {
                    ok: true,
                    skipped: rows.is_empty(),
                    rows_sent: rows.len(),
                    attempts: u32::from(!rows.is_empty()),
                    code: None,
                    error: None,
                }
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn verify(&self, order: &Order) -> Option<ReconciliationResult> {
        if *lock(&self.unreadable) {
            return None;
        }
        self.order(order.code()).map(|o| evaluate_order(&o))
    }

    async fn list_orders(
        &self,
        page_number: u32,
        page_size: u32,
        filters: &ListFilters,
        cancel: Option<&CancellationToken>,
    ) -> Result<OrderPage, FetchCancelled> {
        let held = {
            let mut st = self.lock_state();
            st.list_calls.push(filters.clone());
            st.list_holds.pop_front()
        };
        if let Some(call) = held {
            let _ = call.entered.send(());
            let honor = *lock(&self.honor_cancel);
            match cancel.filter(|_| honor) {
                Some(token) => {
                    tokio::select! {
                        _ = call.release => {}
                        _ = token.cancelled() => return Err(FetchCancelled),
                    }
                }
                None => {
                    let _ = call.release.await;
                }
            }
        }
        if cancel.is_some_and(|t| t.is_cancelled()) && *lock(&self.honor_cancel) {
            return Err(FetchCancelled);
        }

        if let Some(error) = self.lock_state().page_error.clone() {
            return Ok(OrderPage {
                items: Vec::new(),
                total: 0,
                ok: false,
                error: Some(error),
            });
        }

        let all = self.matching(filters);
        let size = page_size.max(1) as usize;
        let skip = (page_number.max(1) as usize - 1) * size;
        Ok(OrderPage {
            total: all.len() as u64,
            items: all.into_iter().skip(skip).take(size).collect(),
            ok: true,
            error: None,
        })
    }

    async fn count_orders(
        &self,
        filters: &ListFilters,
        cancel: Option<&CancellationToken>,
    ) -> Result<u64, FetchCancelled> {
        if cancel.is_some_and(|t| t.is_cancelled()) && *lock(&self.honor_cancel) {
            return Err(FetchCancelled);
        }
        Ok(self.matching(filters).len() as u64)
    }
}

fn hold_pair() -> (HeldCall, CallHold) {
    let (entered_tx, entered_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();
    (
        HeldCall {
            entered: entered_tx,
            release: release_rx,
        },
        CallHold {
            entered: Some(entered_rx),
            release: Some(release_tx),
        },
    )
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn csv_contains(list: &str, value: &str) -> bool {
    list.split(',')
        .map(str::trim)
        .any(|item| item.eq_ignore_ascii_case(value))
}

fn matches(o: &Order, f: &ListFilters) -> bool {
    if !f.order_code.is_empty() && o.code() != f.order_code {
        return false;
    }
    if !f.statuses.is_empty() && !csv_contains(&f.statuses, &o.system_status) {
        return false;
    }
    if !f.departments.is_empty() && !o.lines.iter().any(|l| csv_contains(&f.departments, &l.department)) {
        return false;
    }
    true
}
