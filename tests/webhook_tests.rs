mod common;

use common::{create_request, escrow_harness};
use paycore::domain::payment::{Actor, PaymentStatus};
use paycore::{GatewayError, PaymentError, ReconcileOutcome};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn tampered_delivery_is_rejected() {
    let h = escrow_harness();
    let reconciler = h.reconciler();
    let (mut body, sig) = h.webhook("evt_1", "authorization_succeeded", Some(Uuid::new_v4()));
    body[0] ^= 0x01;

    let result = reconciler.handle(&body, &sig).await;
    assert!(matches!(result, Err(PaymentError::Signature(_))));

    // Rejected deliveries leave no dedup mark; a correctly signed retry of
    // the same event id still goes through.
    let (body, sig) = h.webhook("evt_1", "account_updated", None);
    assert_eq!(
        reconciler.handle(&body, &sig).await.unwrap(),
        ReconcileOutcome::Ignored
    );
}

#[tokio::test]
async fn authorization_event_settles_a_pending_payment() {
    let h = escrow_harness();
    let reconciler = h.reconciler();
    let actor = Actor::user("client-42");
    let payment = h
        .ledger
        .create(&actor, create_request(dec!(100.00)))
        .await
        .unwrap();

    let (body, sig) = h.webhook("evt_auth_1", "authorization_succeeded", Some(payment.id));
    assert_eq!(
        reconciler.handle(&body, &sig).await.unwrap(),
        ReconcileOutcome::Applied
    );
    assert_eq!(
        h.ledger.find_by_id(payment.id).await.unwrap().status,
        PaymentStatus::HeldInEscrow
    );
}

#[tokio::test]
async fn duplicate_deliveries_apply_once() {
    let h = escrow_harness();
    let reconciler = h.reconciler();
    let actor = Actor::user("client-42");
    let payment = h
        .ledger
        .create(&actor, create_request(dec!(100.00)))
        .await
        .unwrap();

    let (body, sig) = h.webhook("evt_auth_2", "authorization_succeeded", Some(payment.id));
    assert_eq!(
        reconciler.handle(&body, &sig).await.unwrap(),
        ReconcileOutcome::Applied
    );
    assert_eq!(
        reconciler.handle(&body, &sig).await.unwrap(),
        ReconcileOutcome::Duplicate
    );
    assert_eq!(h.gateway.authorize_calls(), 1);
    assert_eq!(h.ledger.entries_for(payment.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn redelivery_under_a_new_id_is_a_benign_conflict() {
    let h = escrow_harness();
    let reconciler = h.reconciler();
    let actor = Actor::user("client-42");
    let payment = h
        .ledger
        .create(&actor, create_request(dec!(100.00)))
        .await
        .unwrap();
    h.ledger.process(&actor, payment.id).await.unwrap();
    h.ledger.release(&Actor::system(), payment.id).await.unwrap();

    // The transfer event arrives after the sweep already released.
    let (body, sig) = h.webhook("evt_transfer_1", "transfer_completed", Some(payment.id));
    assert_eq!(
        reconciler.handle(&body, &sig).await.unwrap(),
        ReconcileOutcome::Applied
    );
    // No double release: still one hold pair plus one release triple.
    assert_eq!(h.ledger.entries_for(payment.id).await.unwrap().len(), 5);
}

#[tokio::test]
async fn charge_failure_event_fails_a_stranded_payment() {
    let mut config = paycore::EscrowConfig::default();
    config.gateway_max_attempts = 1;
    let h = common::harness(config);
    let reconciler = h.reconciler();
    let actor = Actor::user("client-42");
    let payment = h
        .ledger
        .create(&actor, create_request(dec!(100.00)))
        .await
        .unwrap();

    // Strand the payment in Processing.
    h.gateway
        .fail_next_authorize(GatewayError::retryable("timeout"));
    assert!(h.ledger.process(&actor, payment.id).await.is_err());
    assert_eq!(
        h.ledger.find_by_id(payment.id).await.unwrap().status,
        PaymentStatus::Processing
    );

    // The processor tells us how the charge actually ended.
    let (body, sig) = h.webhook("evt_fail_1", "charge_failed", Some(payment.id));
    assert_eq!(
        reconciler.handle(&body, &sig).await.unwrap(),
        ReconcileOutcome::Applied
    );
    let failed = h.ledger.find_by_id(payment.id).await.unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(
        failed.metadata.get("failure_reason").map(String::as_str),
        Some("reported by processor")
    );
}

#[tokio::test]
async fn transfer_event_releases_escrow() {
    let h = escrow_harness();
    let reconciler = h.reconciler();
    let actor = Actor::user("client-42");
    let payment = h
        .ledger
        .create(&actor, create_request(dec!(100.00)))
        .await
        .unwrap();
    h.ledger.process(&actor, payment.id).await.unwrap();

    let (body, sig) = h.webhook("evt_transfer_2", "transfer_completed", Some(payment.id));
    assert_eq!(
        reconciler.handle(&body, &sig).await.unwrap(),
        ReconcileOutcome::Applied
    );
    assert_eq!(
        h.ledger.find_by_id(payment.id).await.unwrap().status,
        PaymentStatus::ReleasedFromEscrow
    );
}

#[tokio::test]
async fn provider_side_refund_is_applied_without_calling_out() {
    let h = escrow_harness();
    let reconciler = h.reconciler();
    let actor = Actor::user("client-42");
    let payment = h
        .ledger
        .create(&actor, create_request(dec!(100.00)))
        .await
        .unwrap();
    h.ledger.process(&actor, payment.id).await.unwrap();

    let (body, sig) = h.webhook("evt_refund_1", "refund_succeeded", Some(payment.id));
    assert_eq!(
        reconciler.handle(&body, &sig).await.unwrap(),
        ReconcileOutcome::Applied
    );
    assert_eq!(
        h.ledger.find_by_id(payment.id).await.unwrap().status,
        PaymentStatus::Refunded
    );
    // The refund already happened provider-side.
    assert_eq!(h.gateway.refund_calls(), 0);
}

#[tokio::test]
async fn unknown_event_types_are_acknowledged() {
    let h = escrow_harness();
    let reconciler = h.reconciler();
    let (body, sig) = h.webhook("evt_odd_1", "invoice.finalized", None);
    assert_eq!(
        reconciler.handle(&body, &sig).await.unwrap(),
        ReconcileOutcome::Ignored
    );
}

#[tokio::test]
async fn uncorrelatable_events_are_acknowledged() {
    let h = escrow_harness();
    let reconciler = h.reconciler();
    let (body, sig) = h.webhook("evt_nopid_1", "authorization_succeeded", None);
    assert_eq!(
        reconciler.handle(&body, &sig).await.unwrap(),
        ReconcileOutcome::Ignored
    );
}

#[tokio::test]
async fn events_for_unknown_payments_are_acknowledged() {
    let h = escrow_harness();
    let reconciler = h.reconciler();
    let (body, sig) = h.webhook("evt_ghost_1", "transfer_completed", Some(Uuid::new_v4()));
    assert_eq!(
        reconciler.handle(&body, &sig).await.unwrap(),
        ReconcileOutcome::Ignored
    );
}

#[tokio::test]
async fn failed_actions_unmark_the_event_for_redelivery() {
    let mut config = paycore::EscrowConfig::default();
    config.gateway_max_attempts = 1;
    let h = common::harness(config);
    let reconciler = h.reconciler();
    let actor = Actor::user("client-42");
    let payment = h
        .ledger
        .create(&actor, create_request(dec!(100.00)))
        .await
        .unwrap();
    h.ledger.process(&actor, payment.id).await.unwrap();

    // The release behind transfer_completed hits a gateway outage.
    h.gateway
        .fail_next_capture(GatewayError::retryable("processor unavailable"));
    let (body, sig) = h.webhook("evt_transfer_3", "transfer_completed", Some(payment.id));
    assert!(reconciler.handle(&body, &sig).await.is_err());
    assert_eq!(
        h.ledger.find_by_id(payment.id).await.unwrap().status,
        PaymentStatus::HeldInEscrow
    );

    // The provider redelivers the same event id and it succeeds this time.
    assert_eq!(
        reconciler.handle(&body, &sig).await.unwrap(),
        ReconcileOutcome::Applied
    );
    assert_eq!(
        h.ledger.find_by_id(payment.id).await.unwrap().status,
        PaymentStatus::ReleasedFromEscrow
    );
}
