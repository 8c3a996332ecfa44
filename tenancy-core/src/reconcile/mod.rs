//! Project reconciliation.
//!
//! External project signals are keyed by project ID (equal to the tenant ID)
//! and fed into two independent [`KeyedReconcileLoop`]s: one creating tenants,
//! one terminating them. Each loop retries a key with its own backoff until the
//! reconciler acknowledges or fails it.

mod controller;
mod reconciler;

pub use controller::{CreationReconciler, ProjectReconciliationController, TerminationReconciler};
pub use reconciler::{KeyedReconcileLoop, ReconcileOutcome, Reconciler};
