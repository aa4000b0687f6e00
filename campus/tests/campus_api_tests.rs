use std::{path::Path, sync::Arc};

use axum::{Router, response::Response};
use campus::{
    catalog::CANTEENS, pricing::CampusPricing, rule_based_recommender::CampusAdvisor,
    seed::seed_catalog,
};
use chrono::{TimeZone, Utc};
use common::{
    config::Config,
    test_assert, test_assert_eq,
    test_helpers::{TestError, TestResult, test_utils::*},
};
use delivery::{
    clock::{Clock, ManualClock},
    executable_utils::{AppState, build_router},
    mailer::LogMailer,
    service::{DeliveryService, ServiceSettings},
    storage::{AccountDefaults, DeliveryStorage, InMemoryStorage},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn seeded_router() -> TestResult<Router> {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap(),
    ));
    let storage: Arc<dyn DeliveryStorage> = Arc::new(InMemoryStorage::new(AccountDefaults::default()));
    seed_catalog(storage.as_ref(), clock.now())
        .await
        .map_err(|e| TestError::generic(e.to_string()))?;
    let service = Arc::new(DeliveryService::new(
        storage,
        Arc::new(LogMailer),
        clock,
        ServiceSettings::default(),
    ));
    let state = AppState::new(service, Arc::new(CampusPricing), Arc::new(CampusAdvisor::new()));
    Ok(build_router(state, "*"))
}

async fn call(router: &Router, request: http::Request<String>) -> TestResult<Response> {
    router
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| TestError::generic(e.to_string()))
}

async fn json_of(response: Response) -> TestResult<Value> {
    let bytes = response
        .into_body()
        .collect()
        .await
        .map_err(|e| TestError::generic(e.to_string()))?
        .to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn test_seeded_catalog_is_listed() -> TestResult {
    let router = seeded_router().await?;

    let response = call(&router, build_request("GET", "/canteens", None)?).await?;
    check_status_code(response.status(), http::StatusCode::OK)?;
    let canteens = json_of(response).await?;

    test_assert_eq!(canteens.as_array().map(Vec::len), Some(CANTEENS.len()));
    let main = canteens
        .as_array()
        .and_then(|all| all.iter().find(|c| c["name"] == "Main Canteen"))
        .ok_or_else(|| TestError::assertion_failure("Main Canteen missing"))?;
    test_assert_eq!(main["menu"][0]["itemName"], json!("Paneer Butter Masala"));
    Ok(())
}

#[tokio::test]
async fn test_seeding_twice_creates_nothing_new() -> TestResult {
    let storage = InMemoryStorage::new(AccountDefaults::default());
    let at = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();

    let first = seed_catalog(&storage, at)
        .await
        .map_err(|e| TestError::generic(e.to_string()))?;
    let second = seed_catalog(&storage, at)
        .await
        .map_err(|e| TestError::generic(e.to_string()))?;

    test_assert_eq!(first, CANTEENS.len());
    test_assert_eq!(second, 0);
    Ok(())
}

#[tokio::test]
async fn test_quote_uses_zone_weights() -> TestResult {
    let router = seeded_router().await?;
    let body = json!({
        "canteenName": "Nescafe",
        "dropLocation": "Library",
        "items": [{"name": "Cold Coffee", "price": 60, "qty": 2}]
    });

    let response = call(&router, json_request("POST", "/quote", &body)?).await?;
    check_status_code(response.status(), http::StatusCode::OK)?;
    let quote = json_of(response).await?;

    // 10 + 6 + 5 + 5
    test_assert_eq!(quote["deliveryFee"], json!(26.0));
    test_assert_eq!(quote["totalAmount"], json!(146.0));
    Ok(())
}

#[tokio::test]
async fn test_recommendations_for_hurried_student() -> TestResult {
    let router = seeded_router().await?;
    let body = json!({"message": "class in 10 minutes at TIFAC, need something fast"});

    let response = call(&router, json_request("POST", "/recommendations", &body)?).await?;
    check_status_code(response.status(), http::StatusCode::OK)?;
    let result = json_of(response).await?;

    test_assert_eq!(result["request"]["mentionedLocation"], json!("tifac"));
    test_assert_eq!(result["recommendations"][0]["name"], json!("Maggi Noodles"));
    test_assert_eq!(result["recommendations"][0]["canteenName"], json!("Canopy"));
    test_assert!(
        result["reply"]
            .as_str()
            .is_some_and(|reply| reply.contains("0.3km from TIFAC"))
    );
    Ok(())
}

#[test]
fn test_dev_config_resolves_includes() -> TestResult {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/dev.yaml");
    let config = Config::load_with_includes(&path).map_err(|e| TestError::generic(e.to_string()))?;

    test_assert!(config.uses_in_memory_storage());
    test_assert_eq!(config.common.project_name.as_str(), "campus-delivery");
    test_assert!(config.backend.log_level.starts_with("debug"));
    test_assert_eq!(config.otp.resend_limit, 3);
    test_assert!(config.backend.seed_catalog);
    Ok(())
}

#[test]
fn test_prod_config_selects_sql_storage() -> TestResult {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/prod.yaml");
    let config = Config::load_with_includes(&path).map_err(|e| TestError::generic(e.to_string()))?;

    test_assert!(!config.uses_in_memory_storage());
    test_assert!(config.mailer.endpoint.is_some());
    test_assert_eq!(config.backend.log_level.as_str(), "info");
    Ok(())
}
