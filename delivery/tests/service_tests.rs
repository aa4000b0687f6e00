mod support;

use async_trait::async_trait;
use chrono::Duration;
use mockall::mock;
use std::sync::Arc;

use delivery::{
    clock::{Clock, ManualClock},
    error::DeliveryError,
    mailer::{EmailMessage, MailError, Mailer},
    model::OrderStatus,
    service::DeliveryService,
    storage::{AccountDefaults, DeliveryStorage, InMemoryStorage},
};
use support::{Harness, fast_settings, order_payload, start_time};

mock! {
    pub FlakyMailer {}

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
    }
}

async fn accepted_order(harness: &Harness, student: &str, total: f64, fee: f64) -> String {
    let order = harness
        .service
        .place_order(&order_payload(student, total, fee))
        .await
        .unwrap();
    harness.service.accept_order(&order.id, "B").await.unwrap();
    order.id
}

#[tokio::test]
async fn test_email_failure_keeps_code_and_reports_error() {
    let storage: Arc<dyn DeliveryStorage> =
        Arc::new(InMemoryStorage::new(AccountDefaults::default()));
    let mut mailer = MockFlakyMailer::new();
    mailer
        .expect_send()
        .times(3)
        .returning(|_| Err(MailError::Transport("smtp relay down".into())));
    let service = DeliveryService::new(
        storage.clone(),
        Arc::new(mailer),
        Arc::new(ManualClock::new(start_time())),
        fast_settings(),
    );
    let order = service
        .place_order(&order_payload("S", 150.0, 20.0))
        .await
        .unwrap();
    service.accept_order(&order.id, "B").await.unwrap();

    let err = service.start_pickup(&order.id, Some("B")).await.unwrap_err();

    assert!(matches!(err, DeliveryError::Mail(MailError::Exhausted { attempts: 3, .. })));
    assert_eq!(err.to_string(), "Failed to send OTP email after 3 attempts");
    assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    let stored = storage.get_order(&order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::PickedUp);
    assert!(stored.has_pending_otp());
}

#[tokio::test]
async fn test_resend_is_limited_per_window() {
    let harness = Harness::new();
    let id = accepted_order(&harness, "S", 150.0, 20.0).await;
    harness.service.start_pickup(&id, Some("B")).await.unwrap();

    for _ in 0..3 {
        harness.clock.advance(Duration::minutes(1));
        harness.service.resend_otp(&id).await.unwrap();
    }
    let err = harness.service.resend_otp(&id).await.unwrap_err();
    assert!(matches!(err, DeliveryError::RateLimited { .. }));
    assert_eq!(harness.mailer.sent().len(), 4);

    harness.clock.advance(Duration::minutes(15));
    harness.service.resend_otp(&id).await.unwrap();
    assert_eq!(harness.mailer.sent().len(), 5);
}

#[tokio::test]
async fn test_expired_code_fails_then_resent_code_settles() {
    let harness = Harness::new();
    let id = accepted_order(&harness, "S", 150.0, 20.0).await;
    harness.service.start_pickup(&id, None).await.unwrap();
    let first = harness.mailer.last_code().unwrap();

    harness.clock.advance(Duration::minutes(10));
    let err = harness.service.verify_otp(&id, &first, "B").await.unwrap_err();
    assert!(matches!(err, DeliveryError::OtpExpired));

    harness.service.resend_otp(&id).await.unwrap();
    let second = harness.mailer.last_code().unwrap();
    let outcome = harness.service.verify_otp(&id, &second, "B").await.unwrap();

    assert_eq!(outcome.order.status, OrderStatus::Delivered);
    assert_eq!(outcome.order.delivered_at, Some(harness.clock.now()));
    assert_eq!(outcome.wallet.balance, 350.0);
    assert_eq!(outcome.delivery_user.total_earnings, 20.0);
}

#[tokio::test]
async fn test_only_assigned_buddy_can_verify() {
    let harness = Harness::new();
    let id = accepted_order(&harness, "S", 150.0, 20.0).await;
    harness.service.start_pickup(&id, Some("B")).await.unwrap();
    let code = harness.mailer.last_code().unwrap();

    let err = harness.service.verify_otp(&id, &code, "intruder").await.unwrap_err();

    assert!(matches!(err, DeliveryError::NotAssigned { .. }));
    let wallet = harness.service.wallet("S").await.unwrap();
    assert_eq!(wallet.balance, 500.0);
}

#[tokio::test]
async fn test_short_balance_leaves_every_record_untouched() {
    let harness = Harness::new();
    let id = accepted_order(&harness, "S", 620.0, 20.0).await;
    harness.service.start_pickup(&id, Some("B")).await.unwrap();
    let code = harness.mailer.last_code().unwrap();

    let err = harness.service.verify_otp(&id, &code, "B").await.unwrap_err();

    assert!(matches!(err, DeliveryError::InsufficientBalance { .. }));
    let order = harness.service.get_order(&id).await.unwrap();
    assert_eq!(order.status, OrderStatus::PickedUp);
    assert!(order.has_pending_otp());
    assert_eq!(harness.service.wallet("S").await.unwrap().balance, 500.0);
    let buddy = harness.service.delivery_user("B").await.unwrap();
    assert_eq!(buddy.delivery_count, 0);

    harness.service.top_up("S", 200.0).await.unwrap();
    let outcome = harness.service.verify_otp(&id, &code, "B").await.unwrap();
    assert_eq!(outcome.wallet.balance, 80.0);
    assert_eq!(outcome.wallet.history.len(), 2);
}

#[tokio::test]
async fn test_start_pickup_requires_accepted_order() {
    let harness = Harness::new();
    let order = harness
        .service
        .place_order(&order_payload("S", 150.0, 20.0))
        .await
        .unwrap();

    let err = harness.service.start_pickup(&order.id, Some("B")).await.unwrap_err();
    assert!(matches!(
        err,
        DeliveryError::InvalidTransition {
            from: OrderStatus::Placed,
            to: OrderStatus::PickedUp
        }
    ));

    harness.service.accept_order(&order.id, "B").await.unwrap();
    let err = harness.service.start_pickup(&order.id, Some("C")).await.unwrap_err();
    assert!(matches!(err, DeliveryError::NotAssigned { .. }));
    assert!(harness.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_out_for_delivery_then_verify() {
    let harness = Harness::new();
    let id = accepted_order(&harness, "S", 150.0, 20.0).await;
    harness.service.start_pickup(&id, Some("B")).await.unwrap();
    let code = harness.mailer.last_code().unwrap();

    harness
        .service
        .update_status(&id, OrderStatus::OutForDelivery)
        .await
        .unwrap();
    let err = harness
        .service
        .update_status(&id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::InvalidTransition { .. }));

    let outcome = harness.service.verify_otp(&id, &code, "B").await.unwrap();
    assert_eq!(outcome.order.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn test_cancel_clears_pending_state() {
    let harness = Harness::new();
    let id = accepted_order(&harness, "S", 150.0, 20.0).await;

    let cancelled = harness
        .service
        .update_status(&id, OrderStatus::Cancelled)
        .await
        .unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    let err = harness.service.resend_otp(&id).await.unwrap_err();
    assert!(matches!(err, DeliveryError::BusinessRule(_)));
    let err = harness.service.accept_order(&id, "B").await.unwrap_err();
    assert!(matches!(err, DeliveryError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_negative_amounts_never_reach_settlement() {
    let harness = Harness::new();

    let err = harness
        .service
        .place_order(&order_payload("S", -100.0, -30.0))
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Validation(_)));
    assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    assert!(harness.service.list_orders(&Default::default()).await.unwrap().is_empty());
    assert_eq!(harness.service.wallet("S").await.unwrap().balance, 500.0);
    assert_eq!(harness.service.delivery_user("B").await.unwrap().total_earnings, 0.0);
}
