//! Shared fixtures: a scriptable gateway double, a manual clock and a wired
//! harness around the in-memory store.

// Each test binary uses a different slice of these fixtures.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use paycore::application::sweep::EscrowSweeper;
use paycore::domain::fees::PercentFeePolicy;
use paycore::domain::gateway::{
    Authorization, AuthorizationStatus, AuthorizeRequest, CaptureResult, GatewayEvent,
    GatewayEventKind, PaymentGateway, RefundResult, TransferResult,
};
use paycore::domain::ports::Clock;
use paycore::infrastructure::in_memory::InMemoryEscrowStore;
use paycore::{
    CreatePaymentRequest, EscrowConfig, GatewayError, PaymentError, PaymentLedger,
    WebhookReconciler,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn starting_2024() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance_days(&self, days: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::days(days);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
struct MockState {
    authorize_errors: VecDeque<GatewayError>,
    capture_errors: VecDeque<GatewayError>,
    refund_errors: VecDeque<GatewayError>,
    payout_errors: VecDeque<GatewayError>,
    pub authorize_calls: u32,
    pub capture_calls: u32,
    pub refund_calls: u32,
    pub payout_calls: u32,
    pub cancel_calls: u32,
}

/// Gateway double. Succeeds by default; failures are scripted per call with
/// `fail_next_*`. Webhook signatures are a keyed digest over the raw body so
/// tampering and wrong-key cases are exercised for real.
pub struct MockGateway {
    state: Mutex<MockState>,
    secret: String,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            secret: "whsec_test".to_string(),
        }
    }

    pub fn fail_next_authorize(&self, err: GatewayError) {
        self.state.lock().unwrap().authorize_errors.push_back(err);
    }

    pub fn fail_next_capture(&self, err: GatewayError) {
        self.state.lock().unwrap().capture_errors.push_back(err);
    }

    pub fn fail_next_refund(&self, err: GatewayError) {
        self.state.lock().unwrap().refund_errors.push_back(err);
    }

    pub fn authorize_calls(&self) -> u32 {
        self.state.lock().unwrap().authorize_calls
    }

    pub fn capture_calls(&self) -> u32 {
        self.state.lock().unwrap().capture_calls
    }

    pub fn refund_calls(&self) -> u32 {
        self.state.lock().unwrap().refund_calls
    }

    pub fn payout_calls(&self) -> u32 {
        self.state.lock().unwrap().payout_calls
    }

    pub fn cancel_calls(&self) -> u32 {
        self.state.lock().unwrap().cancel_calls
    }

    /// Signature the provider would attach to `body`.
    pub fn sign(&self, body: &[u8]) -> String {
        Self::digest(body, &self.secret)
    }

    fn digest(body: &[u8], secret: &str) -> String {
        // Cheap keyed digest, stable across runs. Not cryptographic; this is
        // a test double.
        let mut acc: u64 = 0xcbf2_9ce4_8422_2325;
        for b in body.iter().chain(secret.as_bytes()) {
            acc ^= *b as u64;
            acc = acc.wrapping_mul(0x100_0000_01b3);
        }
        format!("v1={acc:016x}")
    }
}

#[derive(Deserialize)]
struct WebhookBody {
    id: String,
    #[serde(rename = "type")]
    kind: GatewayEventKind,
    #[serde(default)]
    payment_id: Option<Uuid>,
    #[serde(default)]
    external_ref: Option<String>,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    reason: Option<String>,
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> Result<Authorization, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.authorize_calls += 1;
        if let Some(err) = state.authorize_errors.pop_front() {
            return Err(err);
        }
        Ok(Authorization {
            external_ref: format!("auth_{}", request.payment_id),
            status: if request.hold {
                AuthorizationStatus::Authorized
            } else {
                AuthorizationStatus::Captured
            },
        })
    }

    async fn capture(
        &self,
        external_ref: &str,
        amount: Decimal,
        _currency: &str,
    ) -> Result<CaptureResult, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.capture_calls += 1;
        if let Some(err) = state.capture_errors.pop_front() {
            return Err(err);
        }
        Ok(CaptureResult {
            external_ref: external_ref.to_string(),
            amount,
        })
    }

    async fn cancel_authorization(
        &self,
        _external_ref: &str,
        _reason: &str,
    ) -> Result<(), GatewayError> {
        self.state.lock().unwrap().cancel_calls += 1;
        Ok(())
    }

    async fn refund(
        &self,
        external_ref: &str,
        amount: Option<Decimal>,
        _reason: Option<&str>,
    ) -> Result<RefundResult, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.refund_calls += 1;
        if let Some(err) = state.refund_errors.pop_front() {
            return Err(err);
        }
        Ok(RefundResult {
            refund_ref: format!("re_{external_ref}"),
            amount: amount.unwrap_or(Decimal::ZERO),
        })
    }

    async fn payout(
        &self,
        destination: &str,
        _amount: Decimal,
        _currency: &str,
        _metadata: &HashMap<String, String>,
    ) -> Result<TransferResult, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.payout_calls += 1;
        if let Some(err) = state.payout_errors.pop_front() {
            return Err(err);
        }
        Ok(TransferResult {
            transfer_ref: format!("tr_{destination}"),
        })
    }

    fn verify_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> paycore::Result<GatewayEvent> {
        if signature_header != Self::digest(raw_body, &self.secret) {
            return Err(PaymentError::Signature(
                "webhook signature mismatch".to_string(),
            ));
        }
        let body: WebhookBody = serde_json::from_slice(raw_body)
            .map_err(|e| PaymentError::Signature(format!("unparseable webhook body: {e}")))?;
        Ok(GatewayEvent {
            id: body.id,
            kind: body.kind,
            payment_id: body.payment_id,
            external_ref: body.external_ref,
            amount: body.amount,
            reason: body.reason,
        })
    }
}

pub struct Harness {
    pub store: Arc<InMemoryEscrowStore>,
    pub gateway: Arc<MockGateway>,
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<PaymentLedger>,
    pub config: EscrowConfig,
}

impl Harness {
    pub fn sweeper(&self) -> EscrowSweeper {
        EscrowSweeper::new(
            self.ledger.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    pub fn reconciler(&self) -> WebhookReconciler {
        WebhookReconciler::new(
            self.ledger.clone(),
            self.gateway.clone(),
            self.store.clone(),
            self.clock.clone(),
        )
    }

    /// Builds a signed webhook delivery for this harness's gateway.
    pub fn webhook(&self, event_id: &str, kind: &str, payment_id: Option<Uuid>) -> (Vec<u8>, String) {
        let mut body = serde_json::json!({ "id": event_id, "type": kind });
        if let Some(id) = payment_id {
            body["payment_id"] = serde_json::json!(id);
        }
        let raw = serde_json::to_vec(&body).unwrap();
        let sig = self.gateway.sign(&raw);
        (raw, sig)
    }
}

/// Wires the ledger against the in-memory store, the mock gateway and a
/// manual clock starting at 2024-01-01T00:00Z. 15% platform fee, no
/// processing fee, so the spec's worked examples hold.
pub fn harness(mut config: EscrowConfig) -> Harness {
    config.platform_fee_percent = dec!(15);
    config.gateway_backoff_base = std::time::Duration::from_millis(1);
    let store = Arc::new(InMemoryEscrowStore::new(config.webhook_dedup_ttl));
    let gateway = Arc::new(MockGateway::new());
    let clock = Arc::new(ManualClock::starting_2024());
    let ledger = Arc::new(PaymentLedger::new(
        store.clone(),
        store.clone(),
        gateway.clone(),
        Arc::new(PercentFeePolicy::platform_only(dec!(15))),
        clock.clone(),
        config.clone(),
    ));
    Harness {
        store,
        gateway,
        clock,
        ledger,
        config,
    }
}

pub fn escrow_harness() -> Harness {
    harness(EscrowConfig::default())
}

pub fn direct_harness() -> Harness {
    let config = EscrowConfig {
        escrow_enabled: false,
        ..EscrowConfig::default()
    };
    harness(config)
}

pub fn create_request(amount: Decimal) -> CreatePaymentRequest {
    CreatePaymentRequest {
        payer_id: "client-42".to_string(),
        payee_id: "freelancer-7".to_string(),
        amount,
        currency: "USD".to_string(),
        method: paycore::domain::payment::PaymentMethod::Card,
        contract_ref: "contract-1".to_string(),
        milestone_ref: "milestone-1".to_string(),
        description: "milestone delivery".to_string(),
        payment_method_ref: "pm_test_visa".to_string(),
    }
}
