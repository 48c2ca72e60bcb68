//! Escrow payment core for a talent marketplace.
//!
//! Moves funds between a payer and a payee through a guaranteed state
//! machine, records every monetary movement in an append-only ledger, and
//! reconciles with the external payment processor via webhooks and scheduled
//! escrow sweeps. HTTP routing, authentication and the contract/milestone
//! workflow live in the host service; this crate exposes the ledger
//! operations, the sweep entry point and the webhook handler they call into.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::ledger::{CreatePaymentRequest, PaymentLedger};
pub use application::reconciler::{ReconcileOutcome, WebhookReconciler};
pub use application::sweep::EscrowSweeper;
pub use config::EscrowConfig;
pub use error::{GatewayError, GatewayErrorKind, PaymentError, Result};
