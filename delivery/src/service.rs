use chrono::Duration;
use metrics::{counter, histogram};
use serde_json::Value;
use std::{sync::Arc, time::Instant};
use tracing::{info, warn};

use common::config::Config;

use crate::{
    batching::{OrderBatch, build_batches},
    clock::Clock,
    error::DeliveryError,
    mailer::{Mailer, RetryPolicy, otp_email, recipient_for, send_with_retry},
    model::{
        Canteen, DeliveryUser, Order, OrderFilter, OrderId, OrderStatus, Wallet,
        new_document_id,
        validation::{validate_canteen_payload, validate_order_payload},
    },
    otp::{OtpIssuer, check_submission},
    rate_limiter::ResendLimiter,
    storage::{DeliveryStorage, Settlement, SettlementOutcome},
};

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub otp_ttl: Duration,
    pub resend_limit: usize,
    pub resend_window: Duration,
    pub retry: RetryPolicy,
    pub mail_from: String,
    pub fallback_email_domain: String,
    pub batch_payout_ratio: f64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            otp_ttl: Duration::seconds(config.otp.ttl_seconds as i64),
            resend_limit: config.otp.resend_limit,
            resend_window: Duration::seconds(config.otp.resend_window_seconds as i64),
            retry: RetryPolicy::from_config(&config.mailer),
            mail_from: config.mailer.from.clone(),
            fallback_email_domain: config.mailer.fallback_domain.clone(),
            batch_payout_ratio: config.delivery.batch_payout_ratio,
        }
    }
}

fn valid_amount(amount: f64) -> Result<f64, DeliveryError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(DeliveryError::Validation("Valid amount is required".to_string()))
    }
}

/// Order lifecycle, handover codes and money movement on top of a store.
pub struct DeliveryService {
    storage: Arc<dyn DeliveryStorage>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    otp: OtpIssuer,
    resend_limiter: ResendLimiter,
    settings: ServiceSettings,
}

impl DeliveryService {
    pub fn new(
        storage: Arc<dyn DeliveryStorage>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            otp: OtpIssuer::new(settings.otp_ttl, clock.clone()),
            resend_limiter: ResendLimiter::new(
                settings.resend_limit,
                settings.resend_window,
                clock.clone(),
            ),
            storage,
            mailer,
            clock,
            settings,
        }
    }

    pub async fn create_canteen(&self, body: &Value) -> Result<(Canteen, bool), DeliveryError> {
        let canteen = validate_canteen_payload(body)?;
        let (canteen, created) = self.storage.upsert_canteen(canteen, self.clock.now()).await?;
        info!(canteen_id = %canteen.id, created, "Canteen saved");
        Ok((canteen, created))
    }

    pub async fn list_canteens(&self) -> Result<Vec<Canteen>, DeliveryError> {
        self.storage.list_canteens().await
    }

    pub async fn place_order(&self, body: &Value) -> Result<Order, DeliveryError> {
        let new_order = validate_order_payload(body)?;
        let order = Order::from_new(new_document_id(), new_order, self.clock.now());
        let order = self.storage.insert_order(order).await?;
        info!(
            order_id = %order.id,
            placed_by = %order.placed_by,
            canteen = %order.canteen_name,
            total = order.total_amount,
            "Order placed"
        );
        Ok(order)
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, DeliveryError> {
        self.storage.list_orders(filter).await
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order, DeliveryError> {
        self.storage
            .get_order(order_id)
            .await?
            .ok_or_else(|| DeliveryError::order_not_found(order_id))
    }

    pub async fn update_status(
        &self,
        order_id: &str,
        next: OrderStatus,
    ) -> Result<Order, DeliveryError> {
        let mut order = self.get_order(order_id).await?;
        match next {
            OrderStatus::Delivered => {
                return Err(DeliveryError::BusinessRule(
                    "Orders are marked DELIVERED only through OTP verification".to_string(),
                ));
            }
            OrderStatus::PickedUp => {
                return Err(DeliveryError::BusinessRule(
                    "Use start-pickup to mark an order PICKED_UP".to_string(),
                ));
            }
            _ => {}
        }
        let previous = order.status;
        if !previous.can_transition_to(next) {
            return Err(DeliveryError::InvalidTransition {
                from: previous,
                to: next,
            });
        }

        order.status = next;
        order.updated_at = self.clock.now();
        if next == OrderStatus::Cancelled {
            order.clear_otp();
        }
        let order = self.storage.replace_order(order, previous).await?;
        if next == OrderStatus::Cancelled {
            self.resend_limiter.forget(order_id);
        }
        info!(order_id, from = %previous, to = %next, "Order status updated");
        Ok(order)
    }

    pub async fn accept_order(&self, order_id: &str, buddy_id: &str) -> Result<Order, DeliveryError> {
        let mut order = self.get_order(order_id).await?;
        if order.status != OrderStatus::Placed {
            return Err(DeliveryError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Accepted,
            });
        }
        if order.picked_by.as_deref().is_some_and(|assigned| assigned != buddy_id) {
            return Err(DeliveryError::BusinessRule(format!(
                "Order {order_id} is already assigned to another buddy"
            )));
        }

        order.picked_by = Some(buddy_id.to_string());
        order.status = OrderStatus::Accepted;
        order.updated_at = self.clock.now();
        let order = self.storage.replace_order(order, OrderStatus::Placed).await?;
        info!(order_id, buddy_id, "Order accepted");
        Ok(order)
    }

    async fn issue_and_send(&self, mut order: Order) -> Result<Order, DeliveryError> {
        let expected_status = order.status;
        let grant = self.otp.issue();
        order.otp = Some(grant.code.clone());
        order.otp_expires_at = Some(grant.expires_at);
        order.updated_at = grant.issued_at;
        if expected_status == OrderStatus::Accepted {
            order.status = OrderStatus::PickedUp;
        }
        let order = self.storage.replace_order(order, expected_status).await?;
        counter!("campus_otp_issued_total").increment(1);

        let to = recipient_for(&order, &self.settings.fallback_email_domain);
        let message = otp_email(&self.settings.mail_from, &to, &order, &grant);
        if let Err(e) = send_with_retry(self.mailer.as_ref(), &message, &self.settings.retry).await
        {
            warn!(order_id = %order.id, error = %e, "OTP stored but email delivery failed");
            return Err(e.into());
        }
        info!(order_id = %order.id, expires_at = %grant.expires_at, "OTP issued and emailed");
        Ok(order)
    }

    pub async fn start_pickup(
        &self,
        order_id: &str,
        buddy_id: Option<&str>,
    ) -> Result<Order, DeliveryError> {
        let mut order = self.get_order(order_id).await?;
        if order.status != OrderStatus::Accepted {
            return Err(DeliveryError::InvalidTransition {
                from: order.status,
                to: OrderStatus::PickedUp,
            });
        }
        match (order.picked_by.as_deref(), buddy_id) {
            (Some(assigned), Some(buddy)) if assigned != buddy => {
                return Err(DeliveryError::NotAssigned {
                    order_id: order_id.to_string(),
                    buddy_id: buddy.to_string(),
                });
            }
            (None, Some(buddy)) => order.picked_by = Some(buddy.to_string()),
            (None, None) => {
                return Err(DeliveryError::Validation("pickedby is required".to_string()));
            }
            _ => {}
        }
        self.issue_and_send(order).await
    }

    pub async fn resend_otp(&self, order_id: &str) -> Result<Order, DeliveryError> {
        let order = self.get_order(order_id).await?;
        if !order.status.awaits_handover() {
            return Err(DeliveryError::BusinessRule(
                "OTP can only be resent while the order is picked up or out for delivery"
                    .to_string(),
            ));
        }
        self.resend_limiter.try_acquire(order_id)?;
        self.issue_and_send(order).await
    }

    pub async fn verify_otp(
        &self,
        order_id: &str,
        submitted: &str,
        buddy_id: &str,
    ) -> Result<SettlementOutcome, DeliveryError> {
        let order = self.get_order(order_id).await?;
        let now = self.clock.now();
        let expected_otp = check_submission(&order, submitted, buddy_id, now).inspect_err(|e| {
            counter!("campus_otp_verify_failures_total", "reason" => e.kind()).increment(1);
            info!(order_id, buddy_id, reason = e.kind(), "OTP verification failed");
        })?;

        let settlement = Settlement {
            order_id: order.id.clone(),
            expected_otp,
            student_id: order.placed_by.clone(),
            buddy_id: buddy_id.to_string(),
            amount: order.total_amount,
            fee: order.delivery_fee,
            at: now,
        };
        let started = Instant::now();
        let outcome = self.storage.settle_delivery(&settlement).await;
        histogram!("campus_settlement_seconds").record(started.elapsed().as_secs_f64());
        let outcome = outcome.inspect_err(|e| {
            counter!("campus_otp_verify_failures_total", "reason" => e.kind()).increment(1);
            warn!(order_id, error = %e, "Settlement rejected");
        })?;

        self.resend_limiter.forget(order_id);
        info!(
            order_id,
            student = %settlement.student_id,
            buddy = %settlement.buddy_id,
            amount = settlement.amount,
            fee = settlement.fee,
            "Order delivered and settled"
        );
        Ok(outcome)
    }

    pub async fn batches(&self) -> Result<Vec<OrderBatch>, DeliveryError> {
        let placed = self
            .storage
            .list_orders(&OrderFilter {
                status: Some(OrderStatus::Placed),
                ..Default::default()
            })
            .await?;
        Ok(build_batches(&placed, self.settings.batch_payout_ratio))
    }

    pub async fn wallet(&self, user_id: &str) -> Result<Wallet, DeliveryError> {
        self.storage
            .get_or_create_wallet(user_id, self.clock.now())
            .await
    }

    pub async fn top_up(&self, user_id: &str, amount: f64) -> Result<Wallet, DeliveryError> {
        let amount = valid_amount(amount)?;
        let wallet = self
            .storage
            .top_up_wallet(user_id, amount, self.clock.now())
            .await?;
        info!(user_id, amount, balance = wallet.balance, "Wallet topped up");
        Ok(wallet)
    }

    pub async fn delivery_user(&self, user_id: &str) -> Result<DeliveryUser, DeliveryError> {
        self.storage
            .get_or_create_delivery_user(user_id, self.clock.now())
            .await
    }

    pub async fn record_earning(
        &self,
        user_id: &str,
        amount: f64,
        order_id: Option<OrderId>,
    ) -> Result<DeliveryUser, DeliveryError> {
        let amount = valid_amount(amount)?;
        self.storage
            .record_earning(user_id, amount, order_id, self.clock.now())
            .await
    }
}

