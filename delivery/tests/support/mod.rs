#![allow(dead_code)]

use async_trait::async_trait;
use axum::{Router, body::Body, http::Request, response::Response};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tower::ServiceExt;

use delivery::{
    clock::ManualClock,
    executable_utils::{AppState, build_router},
    mailer::{EmailMessage, MailError, Mailer, RetryPolicy},
    otp::is_well_formed,
    pricing::PricingPolicy,
    scorers::{RecommendationResponse, Recommender, analyze_request},
    service::{DeliveryService, ServiceSettings},
    storage::{AccountDefaults, DeliveryStorage, InMemoryStorage},
};

/// Keeps every message so tests can read the emailed code.
#[derive(Default)]
pub struct CapturingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl CapturingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_code(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let message = sent.last()?;
        message
            .text
            .split_whitespace()
            .find(|word| is_well_formed(word))
            .map(str::to_string)
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct FlatPricing;

impl PricingPolicy for FlatPricing {
    fn delivery_fee(&self, _canteen: &str, _drop: &str, subtotal: f64) -> f64 {
        (10.0 + subtotal * 0.05 + 10.0 + 5.0).round()
    }
}

pub struct EchoRecommender;

#[async_trait]
impl Recommender for EchoRecommender {
    async fn recommend(&self, message: &str, _limit: usize) -> RecommendationResponse {
        RecommendationResponse {
            request: analyze_request(message, &["vkj"]),
            recommendations: vec![],
            reply: "nothing yet".to_string(),
        }
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
}

pub fn fast_settings() -> ServiceSettings {
    ServiceSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..ServiceSettings::default()
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<CapturingMailer>,
    pub storage: Arc<dyn DeliveryStorage>,
    pub service: Arc<DeliveryService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_storage(Arc::new(InMemoryStorage::new(AccountDefaults::default())))
    }

    pub fn with_storage(storage: Arc<dyn DeliveryStorage>) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let mailer = Arc::new(CapturingMailer::default());
        let service = Arc::new(DeliveryService::new(
            storage.clone(),
            mailer.clone(),
            clock.clone(),
            fast_settings(),
        ));
        Self {
            clock,
            mailer,
            storage,
            service,
        }
    }

    pub fn router(&self) -> Router {
        let state = AppState::new(
            self.service.clone(),
            Arc::new(FlatPricing),
            Arc::new(EchoRecommender),
        );
        build_router(state, "*")
    }
}

pub fn order_payload(student: &str, total: f64, fee: f64) -> Value {
    json!({
        "canteenName": "Main Canteen",
        "pickupPoint": "Counter 1",
        "dropLocation": "VKJ",
        "items": [{"id": 101, "name": "Paneer Butter Masala", "price": total - fee, "qty": 1, "veg": true}],
        "subtotal": total - fee,
        "deliveryFee": fee,
        "totalAmount": total,
        "placedby": student,
        "pickedby": null,
        "studentEmail": format!("{student}@students.campus.edu")
    })
}

pub async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
