use crate::application::retry::{with_retry, RetryPolicy};
use crate::application::transactions::TransactionLedger;
use crate::config::EscrowConfig;
use crate::domain::fees::{round_money, FeePolicy};
use crate::domain::gateway::{AuthorizeRequest, GatewayRef};
use crate::domain::ledger_entry::LedgerEntry;
use crate::domain::payment::{Actor, Payment, PaymentMethod, PaymentStatus};
use crate::domain::ports::{ClockRef, LedgerStoreRef, PaymentStoreRef};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Input for `PaymentLedger::create`, supplied by the contract/milestone
/// service.
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub payer_id: String,
    pub payee_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub contract_ref: String,
    pub milestone_ref: String,
    pub description: String,
    /// Provider-side reference to the payer's instrument, consumed later by
    /// `process`.
    pub payment_method_ref: String,
}

/// Owns the lifecycle of payments. Every mutation, whether requested
/// directly, by the escrow sweeper or by the webhook reconciler, goes through
/// the transition commits in here — there is no second code path.
pub struct PaymentLedger {
    payments: PaymentStoreRef,
    transactions: TransactionLedger,
    gateway: GatewayRef,
    fee_policy: Arc<dyn FeePolicy>,
    clock: ClockRef,
    config: EscrowConfig,
    retry: RetryPolicy,
}

impl PaymentLedger {
    pub fn new(
        payments: PaymentStoreRef,
        ledger: LedgerStoreRef,
        gateway: GatewayRef,
        fee_policy: Arc<dyn FeePolicy>,
        clock: ClockRef,
        config: EscrowConfig,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            payments,
            transactions: TransactionLedger::new(ledger),
            gateway,
            fee_policy,
            clock,
            config,
            retry,
        }
    }

    /// Validates the request, prices the fee and persists a `Pending`
    /// payment. No gateway call happens here.
    pub async fn create(&self, actor: &Actor, req: CreatePaymentRequest) -> Result<Payment> {
        if req.payer_id.trim().is_empty() || req.payee_id.trim().is_empty() {
            return Err(PaymentError::validation("payer and payee ids are required"));
        }
        if req.payer_id == req.payee_id {
            return Err(PaymentError::validation("payer and payee must differ"));
        }
        if req.contract_ref.trim().is_empty() || req.milestone_ref.trim().is_empty() {
            return Err(PaymentError::validation(
                "contract and milestone references are required",
            ));
        }
        if req.amount <= Decimal::ZERO {
            return Err(PaymentError::validation("amount must be positive"));
        }
        if !self.config.supports_currency(&req.currency) {
            return Err(PaymentError::validation(format!(
                "unsupported currency: {}",
                req.currency
            )));
        }

        let amount = round_money(req.amount, &req.currency);
        if amount <= Decimal::ZERO {
            return Err(PaymentError::validation(
                "amount rounds to zero in this currency",
            ));
        }
        let fee = self.fee_policy.fee(amount, &req.currency).total();
        if fee > amount {
            return Err(PaymentError::validation(format!(
                "fee {fee} exceeds amount {amount}"
            )));
        }

        let now = self.clock.now();
        let mut metadata = HashMap::new();
        metadata.insert("description".to_string(), req.description);
        metadata.insert(
            "payment_method_ref".to_string(),
            req.payment_method_ref,
        );
        metadata.insert("created_by".to_string(), actor.id.clone());

        let payment = Payment {
            id: Uuid::new_v4(),
            contract_ref: req.contract_ref,
            milestone_ref: req.milestone_ref,
            payer_id: req.payer_id,
            payee_id: req.payee_id,
            amount,
            currency: req.currency,
            fee,
            status: PaymentStatus::Pending,
            method: req.method,
            gateway_ref: None,
            payout_ref: None,
            metadata,
            escrow_held_at: None,
            escrow_release_due: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        self.payments.insert(payment.clone()).await?;
        info!(payment_id = %payment.id, amount = %payment.amount, fee = %payment.fee, "payment created");
        Ok(payment)
    }

    /// Authorizes funds at the gateway and settles the payment into
    /// `Completed` (escrow off) or `HeldInEscrow` (escrow on).
    ///
    /// Idempotent: a payment that already left `Pending` is returned as-is,
    /// except `Processing`, where a crashed earlier run is recovered by
    /// re-running the gateway call. The claim (`Pending → Processing`) and
    /// the outcome commit are both conditional writes, so concurrent callers
    /// cannot both settle the payment.
    pub async fn process(&self, _actor: &Actor, id: Uuid) -> Result<Payment> {
        let payment = self.get(id).await?;

        let claimed = match payment.status {
            PaymentStatus::Pending => {
                let mut claimed = payment.clone();
                claimed.status = PaymentStatus::Processing;
                claimed.updated_at = self.clock.now();
                if !self
                    .payments
                    .commit(PaymentStatus::Pending, claimed.clone(), Vec::new())
                    .await?
                {
                    // Another actor claimed it first; report current state.
                    return self.get(id).await;
                }
                claimed
            }
            // Crash recovery: the claim exists, the outcome was never
            // committed. Re-run the gateway call; authorization requests are
            // keyed by payment id, so the provider treats this idempotently.
            PaymentStatus::Processing => payment,
            _ => return Ok(payment),
        };

        let request = AuthorizeRequest {
            payment_id: claimed.id,
            amount: claimed.amount,
            currency: claimed.currency.clone(),
            method: claimed.method,
            payment_method_ref: claimed
                .metadata
                .get("payment_method_ref")
                .cloned()
                .unwrap_or_default(),
            hold: self.config.escrow_enabled,
            description: claimed
                .metadata
                .get("description")
                .cloned()
                .unwrap_or_default(),
            metadata: HashMap::from([("payment_id".to_string(), claimed.id.to_string())]),
        };

        let authorization = match with_retry(&self.retry, "authorize", || {
            self.gateway.authorize(request.clone())
        })
        .await
        {
            Ok(authorization) => authorization,
            Err(err) if err.is_retryable() => {
                // Left in Processing on purpose: the next process call (or
                // the matching webhook) finishes the job.
                warn!(payment_id = %id, error = %err, "authorization retries exhausted");
                return Err(err.into());
            }
            Err(err) => {
                let mut failed = claimed.clone();
                failed.status = PaymentStatus::Failed;
                failed.updated_at = self.clock.now();
                failed
                    .metadata
                    .insert("failure_reason".to_string(), err.message.clone());
                if !self
                    .payments
                    .commit(PaymentStatus::Processing, failed, Vec::new())
                    .await?
                {
                    warn!(payment_id = %id, "failure commit lost to a concurrent transition");
                }
                info!(payment_id = %id, error = %err, "payment failed at authorization");
                return Err(err.into());
            }
        };

        let now = self.clock.now();
        let mut settled = claimed.clone();
        settled.gateway_ref = Some(authorization.external_ref);
        settled.updated_at = now;

        let entries: Vec<LedgerEntry>;
        if self.config.escrow_enabled {
            settled.status = PaymentStatus::HeldInEscrow;
            settled.escrow_held_at = Some(now);
            settled.escrow_release_due = Some(now + self.config.hold_period());
            entries = TransactionLedger::escrow_hold_entries(&settled, now);
        } else {
            settled.status = PaymentStatus::Completed;
            settled.completed_at = Some(now);
            entries = TransactionLedger::capture_entries(&settled, now);
        }

        if !self
            .payments
            .commit(PaymentStatus::Processing, settled.clone(), entries)
            .await?
        {
            return self.get(id).await;
        }
        info!(payment_id = %id, status = %settled.status, "payment processed");
        Ok(settled)
    }

    /// Captures the escrow hold and credits the payee. Legal only from
    /// `HeldInEscrow`. On gateway failure the payment is left unchanged and
    /// the error surfaces; the operation is retryable.
    pub async fn release(&self, actor: &Actor, id: Uuid) -> Result<Payment> {
        let payment = self.get(id).await?;
        if payment.status != PaymentStatus::HeldInEscrow {
            return Err(PaymentError::conflict(
                id,
                payment.status.as_str(),
                "release",
            ));
        }
        let gateway_ref = payment
            .gateway_ref
            .clone()
            .ok_or_else(|| PaymentError::storage(format!("payment {id} has no gateway reference")))?;

        with_retry(&self.retry, "capture", || {
            self.gateway
                .capture(&gateway_ref, payment.amount, &payment.currency)
        })
        .await?;

        let now = self.clock.now();
        let mut released = payment.clone();
        released.status = PaymentStatus::ReleasedFromEscrow;
        released.completed_at = Some(now);
        released.updated_at = now;
        released
            .metadata
            .insert("released_by".to_string(), actor.id.clone());

        let entries = TransactionLedger::escrow_release_entries(&released, now);
        if !self
            .payments
            .commit(PaymentStatus::HeldInEscrow, released.clone(), entries)
            .await?
        {
            // Lost the race against a concurrent release or refund.
            return self.get(id).await;
        }
        info!(payment_id = %id, actor = %actor.id, "escrow released");
        Ok(released)
    }

    /// Refunds the payer, fully or partially. Legal from `Completed` or
    /// `HeldInEscrow`; any non-zero refund is terminal for this payment.
    ///
    /// A full refund of an uncaptured hold is executed as an authorization
    /// void at the processor, which returns the funds without a settlement
    /// round-trip. Everything else goes through the processor's refund call.
    pub async fn refund(
        &self,
        actor: &Actor,
        id: Uuid,
        reason: &str,
        amount: Option<Decimal>,
    ) -> Result<Payment> {
        let payment = self.get(id).await?;
        if !matches!(
            payment.status,
            PaymentStatus::Completed | PaymentStatus::HeldInEscrow
        ) {
            return Err(PaymentError::conflict(id, payment.status.as_str(), "refund"));
        }
        let refund_amount = self.validate_refund_amount(&payment, amount)?;
        let gateway_ref = payment
            .gateway_ref
            .clone()
            .ok_or_else(|| PaymentError::storage(format!("payment {id} has no gateway reference")))?;

        if payment.status == PaymentStatus::HeldInEscrow && refund_amount == payment.amount {
            with_retry(&self.retry, "cancel_authorization", || {
                self.gateway.cancel_authorization(&gateway_ref, reason)
            })
            .await?;
        } else {
            with_retry(&self.retry, "refund", || {
                self.gateway
                    .refund(&gateway_ref, Some(refund_amount), Some(reason))
            })
            .await?;
        }

        self.commit_refund(&payment, refund_amount, reason, actor).await
    }

    /// Applies a refund reported by the provider without calling out again.
    /// Used by the webhook reconciler when a refund happened provider-side
    /// (e.g. issued from the processor dashboard). Already-refunded payments
    /// are a no-op.
    pub async fn confirm_refund(
        &self,
        actor: &Actor,
        id: Uuid,
        amount: Option<Decimal>,
        reason: &str,
    ) -> Result<Payment> {
        let payment = self.get(id).await?;
        if payment.status == PaymentStatus::Refunded {
            return Ok(payment);
        }
        if !matches!(
            payment.status,
            PaymentStatus::Completed | PaymentStatus::HeldInEscrow
        ) {
            return Err(PaymentError::conflict(id, payment.status.as_str(), "refund"));
        }
        let refund_amount = self.validate_refund_amount(&payment, amount)?;
        self.commit_refund(&payment, refund_amount, reason, actor).await
    }

    /// Marks an in-flight payment failed from a provider charge-failure
    /// event. No money-moving entries are written.
    pub async fn fail(&self, _actor: &Actor, id: Uuid, reason: &str) -> Result<Payment> {
        let payment = self.get(id).await?;
        if payment.status == PaymentStatus::Failed {
            return Ok(payment);
        }
        if !payment.status.can_transition_to(PaymentStatus::Failed) {
            return Err(PaymentError::conflict(id, payment.status.as_str(), "fail"));
        }
        let mut failed = payment.clone();
        failed.status = PaymentStatus::Failed;
        failed.updated_at = self.clock.now();
        failed
            .metadata
            .insert("failure_reason".to_string(), reason.to_string());
        if !self
            .payments
            .commit(payment.status, failed.clone(), Vec::new())
            .await?
        {
            return self.get(id).await;
        }
        info!(payment_id = %id, reason, "payment marked failed");
        Ok(failed)
    }

    /// Withdraws a payment before any gateway call. Legal only from
    /// `Pending`; anything later must go through refund.
    pub async fn cancel(&self, actor: &Actor, id: Uuid, reason: &str) -> Result<Payment> {
        let payment = self.get(id).await?;
        if payment.status != PaymentStatus::Pending {
            return Err(PaymentError::conflict(id, payment.status.as_str(), "cancel"));
        }
        let mut cancelled = payment.clone();
        cancelled.status = PaymentStatus::Cancelled;
        cancelled.updated_at = self.clock.now();
        cancelled
            .metadata
            .insert("cancel_reason".to_string(), reason.to_string());
        cancelled
            .metadata
            .insert("cancelled_by".to_string(), actor.id.clone());
        if !self
            .payments
            .commit(PaymentStatus::Pending, cancelled.clone(), Vec::new())
            .await?
        {
            return Err(PaymentError::conflict(id, "processing", "cancel"));
        }
        info!(payment_id = %id, "payment cancelled");
        Ok(cancelled)
    }

    /// Pays the released funds out to the payee's connected account.
    /// Idempotent: a payment that already has a payout reference is returned
    /// unchanged.
    pub async fn payout_released(
        &self,
        _actor: &Actor,
        id: Uuid,
        destination: &str,
    ) -> Result<Payment> {
        let payment = self.get(id).await?;
        if !matches!(
            payment.status,
            PaymentStatus::ReleasedFromEscrow | PaymentStatus::Completed
        ) {
            return Err(PaymentError::conflict(id, payment.status.as_str(), "payout"));
        }
        if payment.payout_ref.is_some() {
            return Ok(payment);
        }

        let metadata = HashMap::from([("payment_id".to_string(), id.to_string())]);
        let transfer = with_retry(&self.retry, "payout", || {
            self.gateway.payout(
                destination,
                payment.payee_net(),
                &payment.currency,
                &metadata,
            )
        })
        .await?;

        let now = self.clock.now();
        let mut paid = payment.clone();
        paid.payout_ref = Some(transfer.transfer_ref);
        paid.updated_at = now;
        let entries = TransactionLedger::payout_entries(&paid, destination, now);
        if !self
            .payments
            .commit(payment.status, paid.clone(), entries)
            .await?
        {
            return self.get(id).await;
        }
        info!(payment_id = %id, destination, "payout sent");
        Ok(paid)
    }

    /// Adds a metadata annotation. The only mutation allowed on payments in
    /// a terminal status.
    pub async fn annotate(&self, actor: &Actor, id: Uuid, key: &str, value: &str) -> Result<Payment> {
        // Status may move under us; a couple of re-reads cover it.
        for _ in 0..3 {
            let payment = self.get(id).await?;
            let mut annotated = payment.clone();
            annotated.metadata.insert(key.to_string(), value.to_string());
            annotated
                .metadata
                .insert(format!("{key}:annotated_by"), actor.id.clone());
            annotated.updated_at = self.clock.now();
            if self
                .payments
                .commit(payment.status, annotated.clone(), Vec::new())
                .await?
            {
                return Ok(annotated);
            }
        }
        Err(PaymentError::storage(format!(
            "annotation on payment {id} kept losing to concurrent transitions"
        )))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Payment> {
        self.get(id).await
    }

    /// Ledger entries for a payment, in creation order.
    pub async fn entries_for(&self, id: Uuid) -> Result<Vec<LedgerEntry>> {
        self.transactions.entries_for(id).await
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    async fn get(&self, id: Uuid) -> Result<Payment> {
        self.payments
            .get(id)
            .await?
            .ok_or_else(|| PaymentError::not_found(format!("payment {id}")))
    }

    fn validate_refund_amount(
        &self,
        payment: &Payment,
        amount: Option<Decimal>,
    ) -> Result<Decimal> {
        let refund_amount = round_money(
            amount.unwrap_or(payment.amount),
            &payment.currency,
        );
        if refund_amount <= Decimal::ZERO {
            return Err(PaymentError::validation("refund amount must be positive"));
        }
        if refund_amount > payment.amount {
            return Err(PaymentError::validation(format!(
                "refund {refund_amount} exceeds captured amount {}",
                payment.amount
            )));
        }
        Ok(refund_amount)
    }

    async fn commit_refund(
        &self,
        payment: &Payment,
        refund_amount: Decimal,
        reason: &str,
        actor: &Actor,
    ) -> Result<Payment> {
        let now = self.clock.now();
        let mut refunded = payment.clone();
        refunded.status = PaymentStatus::Refunded;
        refunded.updated_at = now;
        refunded
            .metadata
            .insert("refund_reason".to_string(), reason.to_string());
        refunded
            .metadata
            .insert("refunded_at".to_string(), now.to_rfc3339());
        refunded
            .metadata
            .insert("refund_amount".to_string(), refund_amount.to_string());
        refunded
            .metadata
            .insert("refunded_by".to_string(), actor.id.clone());

        let entries = TransactionLedger::refund_entries(
            payment,
            refund_amount,
            payment.status,
            reason,
            now,
        );
        if !self
            .payments
            .commit(payment.status, refunded.clone(), entries)
            .await?
        {
            return self.get(payment.id).await;
        }
        info!(payment_id = %payment.id, amount = %refund_amount, reason, "payment refunded");
        Ok(refunded)
    }
}
