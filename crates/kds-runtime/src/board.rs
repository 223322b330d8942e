//! In-memory order collections shown on the display.

use kds_schemas::{ItemState, Order, UiStatus};
use serde::Serialize;

/// The two collections the dashboard renders. Owned by the runtime; the
/// transition machine and the page loader are the only writers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderBoard {
    pub active: Vec<Order>,
    pub completed: Vec<Order>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Collection {
    Active,
    Completed,
}

impl OrderBoard {
    pub fn new(active: Vec<Order>, completed: Vec<Order>) -> Self {
        Self { active, completed }
    }

    pub fn active_index(&self, order_id: &str) -> Option<usize> {
        self.active.iter().position(|o| o.id == order_id)
    }

    pub fn completed_index(&self, order_id: &str) -> Option<usize> {
        self.completed.iter().position(|o| o.id == order_id)
    }

    pub fn find(&self, order_id: &str) -> Option<(Collection, &Order)> {
        if let Some(i) = self.active_index(order_id) {
            return Some((Collection::Active, &self.active[i]));
        }
        self.completed_index(order_id)
            .map(|i| (Collection::Completed, &self.completed[i]))
    }

    fn collection_mut(&mut self, which: Collection) -> &mut Vec<Order> {
        match which {
            Collection::Active => &mut self.active,
            Collection::Completed => &mut self.completed,
        }
    }

    /// Put `before` back where it was, replacing whatever copy of the order
    /// the board holds now. Every other order is left as is.
    ///
    /// Returns `false` (and changes nothing) when the order is no longer on
    /// the board: a newer page load dropped it and owns the board now.
    pub fn restore(&mut self, before: Order, origin: Collection, index: usize) -> bool {
        let current = match self.find(&before.id) {
            Some((c, _)) => c,
            None => return false,
        };
        let list = self.collection_mut(current);
        list.retain(|o| o.id != before.id);

        let list = self.collection_mut(origin);
        let at = index.min(list.len());
        list.insert(at, before);
        true
    }
}

/// Where an order sits in its kitchen lifecycle. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderPhase {
    NotStarted,
    Cooking,
    /// Cooking, and every line is checked off.
    ReadyToComplete,
    Completed,
}

impl OrderPhase {
    pub fn of(order: &Order) -> Self {
        if order.status == UiStatus::Completed {
            return OrderPhase::Completed;
        }
        let cooking = order.cooking || order.status == UiStatus::Active;
        if !cooking {
            return OrderPhase::NotStarted;
        }
        if !order.lines.is_empty() && order.lines.iter().all(|l| l.item_state == ItemState::Checked) {
            OrderPhase::ReadyToComplete
        } else {
            OrderPhase::Cooking
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kds_schemas::OrderLine;

    fn order(status: UiStatus, cooking: bool, states: &[ItemState]) -> Order {
        Order {
            id: "A1".into(),
            business_code: "A1".into(),
            destination: "T1".into(),
            table_id: None,
            order_type: "I".into(),
            created_at: None,
            eta_minutes: 10,
            status,
            system_status: String::new(),
            cooking,
            cooking_started_at: None,
            lines: states
                .iter()
                .enumerate()
                .map(|(i, s)| OrderLine {
                    id: i.to_string(),
                    line_id: i.to_string(),
                    item_code: String::new(),
                    name: "Dish".into(),
                    department: "Grill".into(),
                    department_code: "GRL".into(),
                    quantity: 1.0,
                    raw_status: "NEW".into(),
                    item_state: *s,
                })
                .collect(),
        }
    }

    #[test]
    fn phase_is_derived_from_status_flag_and_lines() {
        let (checked, none) = (ItemState::Checked, ItemState::None);
        assert_eq!(OrderPhase::of(&order(UiStatus::Pending, false, &[checked])), OrderPhase::NotStarted);
        assert_eq!(OrderPhase::of(&order(UiStatus::Active, true, &[checked, none])), OrderPhase::Cooking);
        assert_eq!(
            OrderPhase::of(&order(UiStatus::Active, true, &[checked, checked])),
            OrderPhase::ReadyToComplete
        );
        assert_eq!(OrderPhase::of(&order(UiStatus::Completed, false, &[])), OrderPhase::Completed);
    }

    fn with_id(id: &str, status: UiStatus) -> Order {
        let mut o = order(status, status == UiStatus::Active, &[ItemState::None]);
        o.id = id.into();
        o
    }

    #[test]
    fn restore_replaces_only_the_named_order() {
        let before = with_id("B2", UiStatus::Pending);
        let mut board = OrderBoard::new(
            vec![with_id("A1", UiStatus::Active), with_id("C3", UiStatus::Active)],
            vec![with_id("D4", UiStatus::Completed), with_id("B2", UiStatus::Completed)],
        );

        assert!(board.restore(before.clone(), Collection::Active, 1));
        let active: Vec<_> = board.active.iter().map(|o| o.id.as_str()).collect();
        let completed: Vec<_> = board.completed.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(active, vec!["A1", "B2", "C3"]);
        assert_eq!(completed, vec!["D4"]);
        assert_eq!(board.active[1], before);
        assert_eq!(board.active[0].status, UiStatus::Active);
    }

    #[test]
    fn restore_clamps_index_and_skips_missing_orders() {
        let mut board = OrderBoard::new(vec![with_id("A1", UiStatus::Active)], vec![]);
        assert!(board.restore(with_id("A1", UiStatus::Pending), Collection::Active, 9));
        assert_eq!(board.active.len(), 1);
        assert_eq!(board.active[0].status, UiStatus::Pending);

        let untouched = board.clone();
        assert!(!board.restore(with_id("ZZ", UiStatus::Pending), Collection::Active, 0));
        assert_eq!(board, untouched);
    }

    #[test]
    fn find_reports_the_collection() {
        let board = OrderBoard::new(vec![], vec![order(UiStatus::Completed, false, &[])]);
        assert_eq!(board.find("A1").map(|(c, _)| c), Some(Collection::Completed));
        assert!(board.find("nope").is_none());
    }
}
