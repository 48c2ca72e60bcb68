use crate::domain::payment::PaymentMethod;
use crate::error::GatewayError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Charge request sent to the external processor.
///
/// `payment_id` rides along in the request metadata so every webhook event
/// the provider later emits can be correlated back to the local payment.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    /// Provider-side reference to the payer's instrument.
    pub payment_method_ref: String,
    /// When true, request an authorization hold instead of immediate capture.
    pub hold: bool,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    /// Funds held, capture pending (escrow flow).
    Authorized,
    /// Funds captured immediately (direct flow).
    Captured,
}

#[derive(Debug, Clone)]
pub struct Authorization {
    pub external_ref: String,
    pub status: AuthorizationStatus,
}

#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub external_ref: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct RefundResult {
    pub refund_ref: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct TransferResult {
    pub transfer_ref: String,
}

/// Event types this core reacts to. Providers emit many more; anything not
/// listed maps to `Unknown` and is acknowledged without side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayEventKind {
    AuthorizationSucceeded,
    ChargeFailed,
    TransferCompleted,
    RefundSucceeded,
    AccountUpdated,
    #[serde(untagged)]
    Unknown(String),
}

/// A verified webhook event, already translated out of the provider's wire
/// shape by the gateway adapter.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    /// Provider-assigned event id, the deduplication key.
    pub id: String,
    pub kind: GatewayEventKind,
    /// Local payment this event refers to, recovered from the metadata
    /// attached at authorization time. Absent for account-level events.
    pub payment_id: Option<Uuid>,
    pub external_ref: Option<String>,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

/// The sole boundary to the external card/bank processor. No internal state;
/// implementations wrap a remote service and translate its error shapes into
/// the `GatewayError` taxonomy.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates and confirms a charge. Escrow flows pass `hold = true` to get
    /// an authorization without capture.
    async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> std::result::Result<Authorization, GatewayError>;

    /// Converts a hold into an actual transfer of funds.
    async fn capture(
        &self,
        external_ref: &str,
        amount: Decimal,
        currency: &str,
    ) -> std::result::Result<CaptureResult, GatewayError>;

    async fn cancel_authorization(
        &self,
        external_ref: &str,
        reason: &str,
    ) -> std::result::Result<(), GatewayError>;

    async fn refund(
        &self,
        external_ref: &str,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> std::result::Result<RefundResult, GatewayError>;

    /// Pays out to a payee's connected account.
    async fn payout(
        &self,
        destination: &str,
        amount: Decimal,
        currency: &str,
        metadata: &HashMap<String, String>,
    ) -> std::result::Result<TransferResult, GatewayError>;

    /// Verifies the webhook signature and parses the event. Fails with
    /// `PaymentError::Signature` on mismatch; unsigned payloads are never
    /// trusted.
    fn verify_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> crate::error::Result<GatewayEvent>;
}

pub type GatewayRef = Arc<dyn PaymentGateway>;
