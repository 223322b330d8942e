use kds_schemas::{Order, TargetStatus, APPROVED_CLASS};
use serde::Serialize;

/// What a freshly read order says about its lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub any_inproc: bool,
    /// False for an order with no lines.
    pub all_approved: bool,
    /// True for an order with no lines.
    pub none_inproc: bool,
}

/// Statuses are compared uppercased.
pub fn evaluate<I, S>(statuses: I) -> ReconciliationResult
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = 0usize;
    let mut inproc = 0usize;
    let mut approved = 0usize;
    for s in statuses {
        let up = s.as_ref().trim().to_ascii_uppercase();
        seen += 1;
        if up == "INPROC" {
            inproc += 1;
        }
        if APPROVED_CLASS.contains(&up.as_str()) {
            approved += 1;
        }
    }
    ReconciliationResult {
        any_inproc: inproc > 0,
        all_approved: seen > 0 && approved == seen,
        none_inproc: inproc == 0,
    }
}

pub fn evaluate_order(order: &Order) -> ReconciliationResult {
    evaluate(order.lines.iter().map(|l| l.raw_status.as_str()))
}

/// The predicate a target status must satisfy to count as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Expectation {
    AnyInproc,
    AllApproved,
    NoneInproc,
}

impl Expectation {
    /// `None` for targets with no defined check (REJECTED, unknown codes).
    pub fn for_target(target: &TargetStatus) -> Option<Self> {
        match target {
            TargetStatus::Inproc => Some(Expectation::AnyInproc),
            TargetStatus::Approved => Some(Expectation::AllApproved),
            TargetStatus::New => Some(Expectation::NoneInproc),
            TargetStatus::Rejected | TargetStatus::Other(_) => None,
        }
    }

    pub fn is_met(&self, r: &ReconciliationResult) -> bool {
        match self {
            Expectation::AnyInproc => r.any_inproc,
            Expectation::AllApproved => r.all_approved,
            Expectation::NoneInproc => r.none_inproc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Confirmed,
    Mismatch,
    /// Order not readable, or no check defined for the target.
    Inconclusive,
}

pub fn judge(target: &TargetStatus, observed: Option<&ReconciliationResult>) -> Verdict {
    match (Expectation::for_target(target), observed) {
        (Some(exp), Some(r)) if exp.is_met(r) => Verdict::Confirmed,
        (Some(_), Some(_)) => Verdict::Mismatch,
        _ => Verdict::Inconclusive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_order_is_vacuously_none_inproc_but_not_approved() {
        let r = evaluate(Vec::<&str>::new());
        assert!(!r.any_inproc);
        assert!(!r.all_approved);
        assert!(r.none_inproc);
    }

    #[test]
    fn statuses_are_case_insensitive() {
        let r = evaluate(["done", "Approved", "COMPLETED"]);
        assert!(r.all_approved && r.none_inproc && !r.any_inproc);

        let r = evaluate(["inproc", "APPROVED"]);
        assert!(r.any_inproc && !r.all_approved && !r.none_inproc);
    }

    #[test]
    fn verdict_follows_target() {
        let cooking = evaluate(["INPROC", "NEW"]);
        let fresh = evaluate(["NEW", "NEW"]);

        assert_eq!(judge(&TargetStatus::Inproc, Some(&cooking)), Verdict::Confirmed);
        assert_eq!(judge(&TargetStatus::Inproc, Some(&fresh)), Verdict::Mismatch);
        assert_eq!(judge(&TargetStatus::New, Some(&fresh)), Verdict::Confirmed);
        assert_eq!(judge(&TargetStatus::Approved, Some(&cooking)), Verdict::Mismatch);
        assert_eq!(judge(&TargetStatus::Approved, None), Verdict::Inconclusive);
        assert_eq!(judge(&TargetStatus::Rejected, Some(&fresh)), Verdict::Inconclusive);
    }
}
