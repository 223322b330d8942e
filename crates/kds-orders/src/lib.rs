//! kds-orders
//!
//! Read and write sides of the upstream order API:
//! - [`reader`]: paged order reads, normalized into [`kds_schemas::Order`]
//! - [`mutation`]: status-change batches with upstream-specific shaping
//! - [`modifiers`]: modifier lines added to an existing order
//! - [`departments`]: multi-strategy department lookup
//! - [`notes`]: bounded TTL cache for item notes

pub mod departments;
pub mod modifiers;
pub mod mutation;
pub mod normalizer;
pub mod notes;
pub mod reader;

use std::fmt;

pub use departments::{list_departments, Department, DepartmentList};
pub use modifiers::{AddModifiers, Modifier, ModifierService};
pub use mutation::{build_rows, shape_batch, MutationError, MutationResult, StatusMutationService};
pub use normalizer::{
    extract_error_message, normalize_orders, read_orders_list, read_total_count,
    totals_by_department,
};
pub use notes::{NotesCache, NotesService};
pub use reader::{
    department_selection, ListFilters, OrderPage, OrderReader, ACTIVE_STATUSES,
    COMPLETED_STATUSES,
};

/// The caller's cancellation token fired during a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchCancelled;

impl fmt::Display for FetchCancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fetch cancelled")
    }
}

impl std::error::Error for FetchCancelled {}
