//! `kds orders` handlers.
//!
//! One-shot actions stage the order on the engine's board first (re-read by
//! code), then drive the same transition machine the display uses, so the
//! batch shaping, verification and notices are identical.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use kds_orders::{totals_by_department, AddModifiers, Modifier, ModifierService};
use kds_reconcile::{converge_status, judge, Convergence};
use kds_runtime::{Engine, LoadOutcome, Notice, Tab, TransitionOutcome};
use kds_schemas::{ItemState, StatusChangeRow, TargetStatus, UiStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TabArg {
    Active,
    Completed,
}

impl From<TabArg> for Tab {
    fn from(t: TabArg) -> Self {
        match t {
            TabArg::Active => Tab::Active,
            TabArg::Completed => Tab::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    Start,
    Complete,
    Undo,
    Revert,
}

// ---------------------------------------------------------------------------
// orders list
// ---------------------------------------------------------------------------

pub async fn list(
    engine: &Engine,
    tab: TabArg,
    page: u32,
    departments: &[String],
    totals: bool,
) -> Result<()> {
    let state = match engine.loader.load(tab.into(), page, departments).await {
        LoadOutcome::Committed(s) => s,
        LoadOutcome::Failed(msg) => bail!("order load failed: {msg}"),
        other => bail!("order load did not complete: {other:?}"),
    };

    println!(
        "page={}/{} active_count={} completed_count={}",
        state.current_page, state.total_pages, state.active_count, state.completed_count
    );
    let board = engine.board.read().await;
    let orders = match tab {
        TabArg::Active => &board.active,
        TabArg::Completed => &board.completed,
    };
    for o in orders {
        println!(
            "order={} status={:?} system_status={} lines={} destination={:?}",
            o.id,
            o.status,
            o.system_status,
            o.lines.len(),
            o.destination
        );
    }

    if totals {
        for (dept, items) in totals_by_department(orders) {
            for (item, qty) in items {
                println!("total department={dept:?} item={item:?} qty={qty}");
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// start / complete / undo / revert
// ---------------------------------------------------------------------------

pub async fn act(engine: &Engine, code: &str, action: OrderAction) -> Result<()> {
    let mut order = engine
        .reader()
        .fetch_order_by_code(code, None)
        .await
        .map_err(|e| anyhow!("{e}"))?
        .ok_or_else(|| anyhow!("order {code} not found upstream"))?;

    let id = order.id.clone();
    let mut notices = engine.bus.subscribe();
    {
        let mut board = engine.board.write().await;
        board.active.clear();
        board.completed.clear();
        match action {
            OrderAction::Undo => {
                if order.status != UiStatus::Completed {
                    bail!("order {code} is not completed (status={:?})", order.status);
                }
                board.completed.push(order);
            }
            OrderAction::Complete => {
                for l in &mut order.lines {
                    l.item_state = ItemState::Checked;
                }
                board.active.push(order);
            }
            OrderAction::Start => {
                // The primary action completes an order whose lines are all
                // checked, which is vacuously true for a line-less order.
                if order.all_lines_checked() {
                    bail!(
                        "order {code} has no open lines to start (lines={}); use `orders complete`",
                        order.lines.len()
                    );
                }
                board.active.push(order);
            }
            OrderAction::Revert => board.active.push(order),
        }
    }

    let result = match action {
        OrderAction::Start | OrderAction::Complete => engine.machine.primary_action(&id).await,
        OrderAction::Undo => engine.machine.undo(&id).await,
        OrderAction::Revert => engine.machine.revert(&id).await,
    };

    while let Ok(n) = notices.try_recv() {
        if let Notice::VerificationMismatch { target, observed, .. } = n {
            eprintln!("WARN: VERIFICATION_MISMATCH target={target} observed={observed:?}");
        }
    }

    let out: TransitionOutcome = result?;
    println!(
        "order={} transition={:?} target={} verdict={:?}",
        out.order_id, out.transition, out.target, out.verdict
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// add-modifiers
// ---------------------------------------------------------------------------

/// `CODE=Name`; a bare code doubles as its name.
fn parse_modifier(raw: &str) -> Result<Modifier> {
    let (code, name) = raw.split_once('=').unwrap_or((raw, raw));
    let code = code.trim();
    if code.is_empty() {
        bail!("invalid --modifier '{raw}': expected CODE=Name");
    }
    Ok(Modifier {
        code: code.to_string(),
        name: name.trim().to_string(),
    })
}

pub async fn add_modifiers(
    engine: &Engine,
    code: &str,
    raw: &[String],
    parent_line: Option<String>,
    table: Option<String>,
) -> Result<()> {
    let req = AddModifiers {
        order_code: code.to_string(),
        table_id: table,
        parent_line_id: parent_line,
        modifiers: raw.iter().map(|m| parse_modifier(m)).collect::<Result<_>>()?,
    };
    let res = ModifierService::new(engine.client.clone())
        .add_modifiers(&req, None)
        .await
        .into_result()
        .map_err(|e| anyhow!("adding modifiers to {code} failed: {}", e.message))?;
    println!("order={code} modifiers_added={}", res.rows_sent);
    Ok(())
}

// ---------------------------------------------------------------------------
// verify / heal
// ---------------------------------------------------------------------------

pub async fn verify(engine: &Engine, code: &str, target: Option<&str>) -> Result<()> {
    let observed = engine.backend.verifier().verify_code(code, None).await;
    match &observed {
        Some(r) => println!(
            "order={} any_inproc={} all_approved={} none_inproc={}",
            code, r.any_inproc, r.all_approved, r.none_inproc
        ),
        None => println!("order={code} observed=none"),
    }
    if let Some(t) = target {
        let target = TargetStatus::parse(t);
        println!("target={} verdict={:?}", target, judge(&target, observed.as_ref()));
    }
    Ok(())
}

pub async fn heal(engine: &Engine, code: &str, status: &str, rounds: u32, pause_ms: u64) -> Result<()> {
    let row = StatusChangeRow {
        order_code: code.to_string(),
        line_id: String::new(),
        status: TargetStatus::parse(status),
        department_code: String::new(),
        time_to_complete: 0,
    };
    let outcome = converge_status(
        engine.backend.mutations(),
        engine.reader(),
        &row,
        rounds.max(1),
        Duration::from_millis(pause_ms),
    )
    .await;

    match outcome {
        Convergence::Converged { rounds } => {
            println!("order={code} converged=true rounds={rounds}");
            Ok(())
        }
        Convergence::Diverged { rounds, last_status } => bail!(
            "order {code} did not converge to {} after {rounds} round(s); last status {:?}",
            row.status,
            last_status
        ),
        Convergence::MissingStatus => bail!("--status must not be empty"),
    }
}
