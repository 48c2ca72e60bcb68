use crate::domain::ledger_entry::LedgerEntry;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Durable store for payment rows.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: Payment) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Payment>>;

    /// Atomic conditional commit, the single concurrency primitive of the
    /// core: iff the stored status equals `expected`, replace the payment row
    /// and append `entries` in the same critical section. Returns `false`
    /// when another actor transitioned the payment first; callers treat that
    /// as a benign no-op.
    async fn commit(
        &self,
        expected: PaymentStatus,
        payment: Payment,
        entries: Vec<LedgerEntry>,
    ) -> Result<bool>;

    /// Payments in `HeldInEscrow` with `escrow_release_due <= now`, ordered
    /// by release-due ascending, at most `limit` rows.
    async fn due_for_release(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Payment>>;
}

/// Read side of the append-only ledger. Writes only happen through
/// `PaymentStore::commit`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// All entries for a payment in creation order.
    async fn entries_for(&self, payment_id: Uuid) -> Result<Vec<LedgerEntry>>;
}

/// Seen-webhook-event record backing at-least-once delivery deduplication.
/// Entries expire after the provider's redelivery window.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Marks the event id as processed. Returns `false` if it was already
    /// marked (a duplicate delivery), atomically with the check.
    async fn insert_if_absent(&self, event_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Unmarks an event so the provider's redelivery gets another attempt.
    async fn remove(&self, event_id: &str) -> Result<()>;
}

/// Time source, injected so escrow timing is testable without real clocks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type ProcessedEventStoreRef = Arc<dyn ProcessedEventStore>;
pub type ClockRef = Arc<dyn Clock>;
