use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequest, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use serde_json::Value;
use std::{error::Error, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use common::config::{BackendConfig, Config};

use crate::{
    batching::OrderBatch,
    error::DeliveryError,
    model::{
        Canteen, DeliveryUser, Order, OrderFilter, OrderId, UserId, Wallet,
        validation::{deserialize_optional_user_id, user_id_from_value},
    },
    pricing::{PricingPolicy, Quote, QuoteRequest, quote},
    scorers::{RecommendationResponse, Recommender},
    service::DeliveryService,
    storage::{AccountDefaults, DeliveryStorage, InMemoryStorage, ProdStorage, SettlementOutcome},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "target/debug/config/total_config.yaml")]
    pub config: String,
}

/// Loads `.env`, parses arguments and reads the config file. `DATABASE_URL`
/// and `MAILER_API_KEY` from the environment take precedence over the file.
pub fn initialize_executable() -> Result<Config, Box<dyn Error + Send + Sync>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("No .env file loaded: {e}");
    }
    let args = Args::parse();
    println!("Loading config from: {}", args.config);
    let mut config = Config::load(&args.config)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        if !url.trim().is_empty() {
            config.common.database_url = url;
        }
    }
    if let Ok(key) = std::env::var("MAILER_API_KEY") {
        if !key.trim().is_empty() {
            config.mailer.api_key = Some(key);
        }
    }
}

pub fn initialize_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Tracing already initialized: {e}");
    }
}

pub fn install_metrics_recorder() -> Result<PrometheusHandle, Box<dyn Error + Send + Sync>> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

pub fn account_defaults(config: &Config) -> AccountDefaults {
    AccountDefaults {
        wallet_balance: config.wallet.default_balance,
        rating: config.delivery.default_rating,
    }
}

pub async fn build_storage(config: &Config) -> Result<Arc<dyn DeliveryStorage>, DeliveryError> {
    let defaults = account_defaults(config);
    if config.uses_in_memory_storage() {
        tracing::warn!("Using in-memory storage, data is lost on restart");
        Ok(Arc::new(InMemoryStorage::new(defaults)))
    } else {
        Ok(Arc::new(
            ProdStorage::new(&config.common.database_url, defaults).await?,
        ))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DeliveryService>,
    pub pricing: Arc<dyn PricingPolicy>,
    pub recommender: Arc<dyn Recommender>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        service: Arc<DeliveryService>,
        pricing: Arc<dyn PricingPolicy>,
        recommender: Arc<dyn Recommender>,
    ) -> Self {
        Self {
            service,
            pricing,
            recommender,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// JSON body whose rejections render as `{"error": ...}`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(DeliveryError))]
pub struct JsonBody<T>(pub T);

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let origin = allowed_origin.trim();
    if origin.is_empty() || origin == "*" {
        return layer.allow_origin(Any);
    }
    match origin.parse::<http::HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(e) => {
            tracing::warn!(origin, error = %e, "Invalid allowed origin, allowing any");
            layer.allow_origin(Any)
        }
    }
}

pub fn build_router(state: AppState, allowed_origin: &str) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .route("/canteens", get(list_canteens).post(create_canteen))
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/batches", get(list_batches))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/status", patch(update_status))
        .route("/orders/{id}/accept", patch(accept_order))
        .route("/orders/{id}/start-pickup", post(start_pickup))
        .route("/orders/{id}/resend-otp", post(resend_otp))
        .route("/orders/{id}/verify-otp", post(verify_otp))
        .route("/wallet/{user_id}", get(get_wallet))
        .route("/wallet/{user_id}/topup", post(top_up_wallet))
        .route("/delivery-users/{user_id}", get(get_delivery_user))
        .route("/delivery-users/{user_id}/earn", post(record_earning))
        .route("/quote", post(quote_order))
        .route("/recommendations", post(recommend))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origin))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

pub async fn run_backend(
    config: BackendConfig,
    state: AppState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let app = build_router(state, &config.allowed_origin);

    tracing::info!("Starting backend service at {}", config.server_address);
    let listener = tokio::net::TcpListener::bind(&config.server_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK").into_response()
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics recorder not installed").into_response(),
    }
}

async fn create_canteen(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> Result<(StatusCode, Json<Canteen>), DeliveryError> {
    let (canteen, created) = state.service.create_canteen(&body).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(canteen)))
}

async fn list_canteens(State(state): State<AppState>) -> Result<Json<Vec<Canteen>>, DeliveryError> {
    Ok(Json(state.service.list_canteens().await?))
}

async fn create_order(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> Result<(StatusCode, Json<Order>), DeliveryError> {
    let order = state.service.place_order(&body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<String>,
    pub placedby: Option<String>,
    pub pickedby: Option<String>,
}

impl OrderQuery {
    pub fn into_filter(self) -> Result<OrderFilter, DeliveryError> {
        let status = self
            .status
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse())
            .transpose()
            .map_err(|e: crate::model::UnknownStatus| DeliveryError::Validation(e.to_string()))?;
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Ok(OrderFilter {
            status,
            placed_by: non_empty(self.placedby),
            picked_by: non_empty(self.pickedby),
        })
    }
}

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> Result<Json<Vec<Order>>, DeliveryError> {
    let filter = query.into_filter()?;
    Ok(Json(state.service.list_orders(&filter).await?))
}

async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, DeliveryError> {
    Ok(Json(state.service.get_order(&order_id).await?))
}

async fn list_batches(State(state): State<AppState>) -> Result<Json<Vec<OrderBatch>>, DeliveryError> {
    Ok(Json(state.service.batches().await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: Option<String>,
}

async fn update_status(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    JsonBody(update): JsonBody<StatusUpdate>,
) -> Result<Json<Order>, DeliveryError> {
    let status = update
        .status
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| DeliveryError::Validation("Status is required".to_string()))?
        .parse()
        .map_err(|e: crate::model::UnknownStatus| DeliveryError::Validation(e.to_string()))?;
    Ok(Json(state.service.update_status(&order_id, status).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct BuddyRequest {
    #[serde(default, deserialize_with = "deserialize_optional_user_id")]
    pub pickedby: Option<UserId>,
}

fn required_buddy(pickedby: Option<UserId>) -> Result<UserId, DeliveryError> {
    pickedby.ok_or_else(|| DeliveryError::Validation("pickedby is required".to_string()))
}

async fn accept_order(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    JsonBody(request): JsonBody<BuddyRequest>,
) -> Result<Json<Order>, DeliveryError> {
    let buddy = required_buddy(request.pickedby)?;
    Ok(Json(state.service.accept_order(&order_id, &buddy).await?))
}

/// The start-pickup body is optional; an empty body means "the assigned buddy".
async fn start_pickup(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    body: Bytes,
) -> Result<Json<Order>, DeliveryError> {
    let request: BuddyRequest = if body.iter().all(u8::is_ascii_whitespace) {
        BuddyRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| DeliveryError::Validation(e.to_string()))?
    };
    Ok(Json(
        state
            .service
            .start_pickup(&order_id, request.pickedby.as_deref())
            .await?,
    ))
}

async fn resend_otp(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, DeliveryError> {
    Ok(Json(state.service.resend_otp(&order_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub otp: Value,
    #[serde(default, deserialize_with = "deserialize_optional_user_id")]
    pub pickedby: Option<UserId>,
}

async fn verify_otp(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    JsonBody(request): JsonBody<VerifyRequest>,
) -> Result<Json<SettlementOutcome>, DeliveryError> {
    let otp = match &request.otp {
        Value::String(code) => code.clone(),
        Value::Null => return Err(DeliveryError::Validation("OTP is required".to_string())),
        other => user_id_from_value(other).unwrap_or_default(),
    };
    let buddy = required_buddy(request.pickedby)?;
    Ok(Json(state.service.verify_otp(&order_id, &otp, &buddy).await?))
}

async fn get_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Wallet>, DeliveryError> {
    Ok(Json(state.service.wallet(&user_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountRequest {
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

impl AmountRequest {
    fn amount(&self) -> f64 {
        self.amount.as_f64().unwrap_or(f64::NAN)
    }
}

async fn top_up_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    JsonBody(request): JsonBody<AmountRequest>,
) -> Result<Json<Wallet>, DeliveryError> {
    Ok(Json(state.service.top_up(&user_id, request.amount()).await?))
}

async fn get_delivery_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<DeliveryUser>, DeliveryError> {
    Ok(Json(state.service.delivery_user(&user_id).await?))
}

async fn record_earning(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    JsonBody(request): JsonBody<AmountRequest>,
) -> Result<Json<DeliveryUser>, DeliveryError> {
    let amount = request.amount();
    Ok(Json(
        state
            .service
            .record_earning(&user_id, amount, request.order_id)
            .await?,
    ))
}

async fn quote_order(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<QuoteRequest>,
) -> Result<Json<Quote>, DeliveryError> {
    if request.items.is_empty() {
        return Err(DeliveryError::Validation(
            "items must be a non-empty array".to_string(),
        ));
    }
    Ok(Json(quote(state.pricing.as_ref(), &request)))
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    #[serde(default)]
    pub message: String,
    pub limit: Option<usize>,
}

pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 3;

async fn recommend(
    State(state): State<AppState>,
    JsonBody(query): JsonBody<RecommendationQuery>,
) -> Result<Json<RecommendationResponse>, DeliveryError> {
    if query.message.trim().is_empty() {
        return Err(DeliveryError::Validation("message is required".to_string()));
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECOMMENDATION_LIMIT)
        .clamp(1, 20);
    Ok(Json(state.recommender.recommend(&query.message, limit).await))
}
