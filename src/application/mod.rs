pub mod ledger;
pub mod reconciler;
pub mod retry;
pub mod sweep;
pub mod transactions;
