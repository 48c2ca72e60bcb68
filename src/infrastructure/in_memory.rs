use crate::domain::ledger_entry::LedgerEntry;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{LedgerStore, PaymentStore, ProcessedEventStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    payments: HashMap<Uuid, Payment>,
    /// Creation order preserved; the ledger is append-only.
    entries: Vec<LedgerEntry>,
    seen_events: HashMap<String, DateTime<Utc>>,
}

/// In-memory backing store for the payment core, implementing all three
/// store ports behind one mutex so `commit` really is atomic across the
/// payment row and its ledger entries.
///
/// Suited to tests and single-process deployments; a database adapter would
/// implement the same ports with a transaction per `commit`.
#[derive(Clone)]
pub struct InMemoryEscrowStore {
    inner: Arc<Mutex<Inner>>,
    dedup_ttl: ChronoDuration,
}

impl InMemoryEscrowStore {
    pub fn new(dedup_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            dedup_ttl: ChronoDuration::from_std(dedup_ttl)
                .unwrap_or_else(|_| ChronoDuration::hours(72)),
        }
    }
}

impl Default for InMemoryEscrowStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(72 * 3600))
    }
}

#[async_trait]
impl PaymentStore for InMemoryEscrowStore {
    async fn insert(&self, payment: Payment) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.payments.contains_key(&payment.id) {
            return Err(PaymentError::storage(format!(
                "payment {} already exists",
                payment.id
            )));
        }
        inner.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Payment>> {
        let inner = self.inner.lock().await;
        Ok(inner.payments.get(&id).cloned())
    }

    async fn commit(
        &self,
        expected: PaymentStatus,
        payment: Payment,
        entries: Vec<LedgerEntry>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(current) = inner.payments.get(&payment.id) else {
            return Err(PaymentError::storage(format!(
                "payment {} vanished during commit",
                payment.id
            )));
        };
        if current.status != expected {
            return Ok(false);
        }
        inner.payments.insert(payment.id, payment);
        inner.entries.extend(entries);
        Ok(true)
    }

    async fn due_for_release(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Payment>> {
        let inner = self.inner.lock().await;
        let mut due: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| {
                p.status == PaymentStatus::HeldInEscrow
                    && p.escrow_release_due.is_some_and(|d| d <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|p| p.escrow_release_due);
        due.truncate(limit);
        Ok(due)
    }
}

#[async_trait]
impl LedgerStore for InMemoryEscrowStore {
    async fn entries_for(&self, payment_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.payment_id == payment_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryEscrowStore {
    async fn insert_if_absent(&self, event_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let cutoff = now - self.dedup_ttl;
        inner.seen_events.retain(|_, seen_at| *seen_at > cutoff);
        if inner.seen_events.contains_key(event_id) {
            return Ok(false);
        }
        inner.seen_events.insert(event_id.to_string(), now);
        Ok(true)
    }

    async fn remove(&self, event_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.seen_events.remove(event_id);
        Ok(())
    }
}
