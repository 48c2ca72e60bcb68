use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a payment.
///
/// `Pending → Processing → {Completed | HeldInEscrow | Failed | Cancelled}`;
/// `HeldInEscrow → {ReleasedFromEscrow | Refunded}`; `Completed → Refunded`.
/// Every other transition is rejected with a conflict error. `Cancelled` is
/// additionally reachable straight from `Pending`, before any gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created and fee-priced, no gateway call yet.
    Pending,
    /// Transition claimed; a gateway authorization is (or was) in flight.
    Processing,
    /// Funds captured immediately (escrow disabled for the deployment).
    Completed,
    /// Funds authorized and held, awaiting release or refund.
    HeldInEscrow,
    /// Hold captured and funds credited to the payee.
    ReleasedFromEscrow,
    /// Reversed back to the payer, fully or partially.
    Refunded,
    /// Gateway declined or errored terminally. No money moved.
    Failed,
    /// Withdrawn before capture. No money moved.
    Cancelled,
}

impl PaymentStatus {
    /// Terminal states admit no further money-moving transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::ReleasedFromEscrow
                | Self::Refunded
                | Self::Failed
                | Self::Cancelled
        )
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match self {
            Pending => matches!(next, Processing | Cancelled),
            Processing => matches!(next, Completed | HeldInEscrow | Failed | Cancelled),
            HeldInEscrow => matches!(next, ReleasedFromEscrow | Refunded),
            Completed => matches!(next, Refunded),
            ReleasedFromEscrow | Refunded | Failed | Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::HeldInEscrow => "held_in_escrow",
            Self::ReleasedFromEscrow => "released_from_escrow",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the payer funds the payment. Provider-specific shapes never leak past
/// the gateway adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    PlatformBalance,
}

/// Who is asking for a ledger operation. Passed explicitly into every
/// mutating call instead of any process-wide caller cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    User,
    Admin,
    /// The escrow sweeper and other internal jobs.
    System,
    /// The webhook reconciler acting on provider events.
    Gateway,
}

impl Actor {
    pub fn user<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::User,
        }
    }

    pub fn admin<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Admin,
        }
    }

    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            role: ActorRole::System,
        }
    }

    pub fn gateway() -> Self {
        Self {
            id: "gateway".to_string(),
            role: ActorRole::Gateway,
        }
    }
}

/// One monetary obligation from a payer to a payee for a contract milestone.
///
/// Mutated exclusively through `PaymentLedger`; never hard-deleted. Closed
/// payments remain for audit and accept metadata annotations only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub contract_ref: String,
    pub milestone_ref: String,
    pub payer_id: String,
    pub payee_id: String,
    pub amount: Decimal,
    pub currency: String,
    /// Platform plus processing fee, computed at creation. `fee <= amount`.
    pub fee: Decimal,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    /// Authorization reference from the gateway, set once `process` succeeds.
    pub gateway_ref: Option<String>,
    /// Transfer reference from a payee payout, when one was made.
    pub payout_ref: Option<String>,
    pub metadata: HashMap<String, String>,
    pub escrow_held_at: Option<DateTime<Utc>>,
    pub escrow_release_due: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Net amount the payee receives once fees are taken.
    pub fn payee_net(&self) -> Decimal {
        self.amount - self.fee
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
