//! Pure computation over ledger snapshots: grouping outputs into subscriptions and
//! reconciling locally pending entities against the latest snapshot.

pub mod grouping;
pub mod reconcile;

pub use grouping::group_utxos;
pub use reconcile::{reconcile, Reconciliation};
