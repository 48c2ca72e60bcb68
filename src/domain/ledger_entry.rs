use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Internal holding account for funds authorized but not yet released.
pub const ESCROW_ACCOUNT: &str = "platform:escrow";
/// Internal account credited with platform and processing fees.
pub const FEE_ACCOUNT: &str = "platform:fees";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Direct capture: payer debit / payee credit.
    Payment,
    Fee,
    Refund,
    EscrowHold,
    EscrowRelease,
    Payout,
}

/// One immutable monetary movement caused by a payment event.
///
/// Entries are append-only: they are created inside the same atomic commit as
/// the payment status write and never updated or deleted afterwards. For any
/// payment that reached a money-moving terminal state, the signed amounts of
/// its entries sum to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub payment_id: Uuid,
    /// User id, or one of the `platform:*` accounts.
    pub account: String,
    pub kind: EntryKind,
    /// Signed: debits negative, credits positive.
    pub amount: Decimal,
    pub currency: String,
    /// Running balance for the account after this entry, when the backing
    /// store tracks one. Informational only.
    pub balance_after: Option<Decimal>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        payment_id: Uuid,
        account: &str,
        kind: EntryKind,
        amount: Decimal,
        currency: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            account: account.to_string(),
            kind,
            amount,
            currency: currency.to_string(),
            balance_after: None,
            metadata: HashMap::new(),
            created_at,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Signed sum over a set of entries, used to check the net-zero invariant.
pub fn net_sum(entries: &[LedgerEntry]) -> Decimal {
    entries.iter().map(|e| e.amount).sum()
}
