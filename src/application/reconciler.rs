use crate::application::ledger::PaymentLedger;
use crate::domain::gateway::{GatewayEvent, GatewayEventKind, GatewayRef};
use crate::domain::payment::Actor;
use crate::domain::ports::{ClockRef, ProcessedEventStoreRef};
use crate::error::{PaymentError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a webhook delivery amounted to. All three are acknowledged to the
/// provider; only errors trigger redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A payment transition was applied (or had already been applied by a
    /// racing direct call).
    Applied,
    /// The event id was seen before; no side effects.
    Duplicate,
    /// Unknown or uncorrelatable event, acknowledged without side effects.
    Ignored,
}

/// Applies asynchronous processor events to the payment ledger, keeping
/// local state eventually consistent even when a direct call's response was
/// lost.
///
/// Delivery is at-least-once and unordered, so everything here is idempotent:
/// signature first, then dedup by event id, then the same `PaymentLedger`
/// entry points direct callers use — never a separate mutation path.
pub struct WebhookReconciler {
    ledger: Arc<PaymentLedger>,
    gateway: GatewayRef,
    seen_events: ProcessedEventStoreRef,
    clock: ClockRef,
}

impl WebhookReconciler {
    pub fn new(
        ledger: Arc<PaymentLedger>,
        gateway: GatewayRef,
        seen_events: ProcessedEventStoreRef,
        clock: ClockRef,
    ) -> Self {
        Self {
            ledger,
            gateway,
            seen_events,
            clock,
        }
    }

    /// HTTP-boundary entry point: raw body plus signature header in,
    /// idempotent ledger transition out.
    pub async fn handle(&self, raw_body: &[u8], signature: &str) -> Result<ReconcileOutcome> {
        // Signature failures are fatal for the request and mutate nothing.
        let event = self.gateway.verify_webhook(raw_body, signature)?;

        // Marked before side effects so duplicate concurrent deliveries of
        // the same event cannot both get past this point.
        if !self
            .seen_events
            .insert_if_absent(&event.id, self.clock.now())
            .await?
        {
            debug!(event_id = %event.id, "duplicate webhook event");
            return Ok(ReconcileOutcome::Duplicate);
        }

        match self.apply(&event).await {
            Ok(outcome) => Ok(outcome),
            Err(PaymentError::Conflict { .. }) => {
                // A direct call or the sweeper got there first.
                debug!(event_id = %event.id, "event already reflected in payment state");
                Ok(ReconcileOutcome::Applied)
            }
            Err(PaymentError::NotFound(what)) => {
                warn!(event_id = %event.id, %what, "webhook references unknown payment");
                Ok(ReconcileOutcome::Ignored)
            }
            Err(err) => {
                // Unmark so the provider's redelivery retries the action.
                self.seen_events.remove(&event.id).await?;
                warn!(event_id = %event.id, error = %err, "webhook action failed");
                Err(err)
            }
        }
    }

    async fn apply(&self, event: &GatewayEvent) -> Result<ReconcileOutcome> {
        let actor = Actor::gateway();
        let reason = event.reason.as_deref().unwrap_or("reported by processor");

        match &event.kind {
            GatewayEventKind::Unknown(kind) => {
                // Acknowledged, not an error: unknown types must not block
                // provider retries of everything else.
                info!(event_id = %event.id, kind, "ignoring unknown webhook event type");
                Ok(ReconcileOutcome::Ignored)
            }
            GatewayEventKind::AccountUpdated => {
                debug!(event_id = %event.id, "account event, nothing to reconcile");
                Ok(ReconcileOutcome::Ignored)
            }
            kind => {
                let Some(payment_id) = event.payment_id else {
                    warn!(event_id = %event.id, "event carries no payment correlation id");
                    return Ok(ReconcileOutcome::Ignored);
                };
                match kind {
                    GatewayEventKind::AuthorizationSucceeded => {
                        self.ledger.process(&actor, payment_id).await?;
                    }
                    GatewayEventKind::ChargeFailed => {
                        self.ledger.fail(&actor, payment_id, reason).await?;
                    }
                    GatewayEventKind::TransferCompleted => {
                        self.ledger.release(&actor, payment_id).await?;
                    }
                    GatewayEventKind::RefundSucceeded => {
                        self.ledger
                            .confirm_refund(&actor, payment_id, event.amount, reason)
                            .await?;
                    }
                    GatewayEventKind::AccountUpdated | GatewayEventKind::Unknown(_) => {
                        unreachable!("handled above")
                    }
                }
                info!(event_id = %event.id, payment_id = %payment_id, "webhook event applied");
                Ok(ReconcileOutcome::Applied)
            }
        }
    }
}
