mod reconciliation;

pub use reconciliation::{ReconcileConfig, ReconcileOutcome, Reconciler, percent_error};
