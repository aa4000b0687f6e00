mod support;

use axum::http::StatusCode;
use serde_json::json;

use support::{Harness, body_json, order_payload, send};

#[tokio::test]
async fn test_health_check() {
    let harness = Harness::new();
    let response = send(&harness.router(), "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_otp_handover_settles_order() {
    let harness = Harness::new();
    let router = harness.router();

    let response = send(&router, "POST", "/orders", Some(order_payload("S", 150.0, 20.0))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = body_json(response).await;
    assert_eq!(order["status"], "PLACED");
    let id = order["id"].as_str().unwrap().to_string();

    let response = send(
        &router,
        "PATCH",
        &format!("/orders/{id}/accept"),
        Some(json!({"pickedby": "B"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ACCEPTED");

    let response = send(&router, "POST", &format!("/orders/{id}/start-pickup"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let picked = body_json(response).await;
    assert_eq!(picked["status"], "PICKED_UP");
    assert!(picked.get("otp").is_none());
    assert!(picked["otpExpiresAt"].is_string());

    let code = harness.mailer.last_code().expect("code emailed");
    assert_eq!(harness.mailer.sent()[0].to, "S@students.campus.edu");

    let wrong = if code == "000000" { "111111" } else { "000000" };
    let response = send(
        &router,
        "POST",
        &format!("/orders/{id}/verify-otp"),
        Some(json!({"otp": wrong, "pickedby": "B"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "Invalid OTP"}));

    let response = send(
        &router,
        "POST",
        &format!("/orders/{id}/verify-otp"),
        Some(json!({"otp": code, "pickedby": "B"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = body_json(response).await;
    assert_eq!(outcome["order"]["status"], "DELIVERED");
    assert_eq!(outcome["wallet"]["balance"], 350.0);
    assert_eq!(outcome["wallet"]["history"][0]["type"], "order");
    assert_eq!(outcome["deliveryUser"]["totalEarnings"], 20.0);
    assert_eq!(outcome["deliveryUser"]["deliveryCount"], 1);

    let response = send(
        &router,
        "POST",
        &format!("/orders/{id}/verify-otp"),
        Some(json!({"otp": code, "pickedby": "B"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No OTP found for this order");

    let response = send(&router, "GET", "/wallet/S", None).await;
    assert_eq!(body_json(response).await["balance"], 350.0);
}

#[tokio::test]
async fn test_order_validation_errors_are_json() {
    let harness = Harness::new();
    let router = harness.router();

    let mut payload = order_payload("S", 150.0, 20.0);
    payload["items"] = json!([]);
    let response = send(&router, "POST", "/orders", Some(payload)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"error": "items must be a non-empty array"})
    );

    let response = send(&router, "GET", "/orders/missing", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_malformed_json_is_a_bad_request() {
    let harness = Harness::new();
    let router = harness.router();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/orders")
        .header("Content-Type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let response = tower::ServiceExt::oneshot(router, request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_status_endpoint_guards_state_machine() {
    let harness = Harness::new();
    let router = harness.router();
    let order = body_json(send(&router, "POST", "/orders", Some(order_payload("S", 100.0, 20.0))).await).await;
    let id = order["id"].as_str().unwrap().to_string();
    let uri = format!("/orders/{id}/status");

    let response = send(&router, "PATCH", &uri, Some(json!({"status": "DELIVERED"}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&router, "PATCH", &uri, Some(json!({"status": "out-for-delivery"}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Invalid status transition from PLACED to OUT_FOR_DELIVERY"
    );

    let response = send(&router, "PATCH", &uri, Some(json!({}))).await;
    assert_eq!(body_json(response).await["error"], "Status is required");

    let response = send(&router, "PATCH", &uri, Some(json!({"status": "cancelled"}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "CANCELLED");
}

#[tokio::test]
async fn test_list_orders_filters_by_query() {
    let harness = Harness::new();
    let router = harness.router();
    for student in ["asha", "ravi", "asha"] {
        send(&router, "POST", "/orders", Some(order_payload(student, 100.0, 20.0))).await;
        harness.clock.advance(chrono::Duration::seconds(1));
    }

    let all = body_json(send(&router, "GET", "/orders", None).await).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let mine = body_json(send(&router, "GET", "/orders?placedby=ASHA&status=placed", None).await).await;
    assert_eq!(mine.as_array().unwrap().len(), 2);

    let response = send(&router, "GET", "/orders?status=lost", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batches_endpoint_offers_shared_routes() {
    let harness = Harness::new();
    let router = harness.router();
    send(&router, "POST", "/orders", Some(order_payload("a", 100.0, 20.0))).await;
    send(&router, "POST", "/orders", Some(order_payload("b", 120.0, 21.0))).await;

    let batches = body_json(send(&router, "GET", "/orders/batches", None).await).await;

    assert_eq!(batches.as_array().unwrap().len(), 1);
    assert_eq!(batches[0]["orderCount"], 2);
    assert_eq!(batches[0]["totalDeliveryFee"], 41.0);
    assert_eq!(batches[0]["suggestedPayout"], 34.85);
}

#[tokio::test]
async fn test_wallet_and_earnings_endpoints() {
    let harness = Harness::new();
    let router = harness.router();

    let wallet = body_json(send(&router, "GET", "/wallet/new-student", None).await).await;
    assert_eq!(wallet["balance"], 500.0);

    let wallet = body_json(
        send(&router, "POST", "/wallet/new-student/topup", Some(json!({"amount": 250}))).await,
    )
    .await;
    assert_eq!(wallet["balance"], 750.0);
    assert_eq!(wallet["history"][0]["type"], "topup");

    let buddy = body_json(send(&router, "GET", "/delivery-users/b9", None).await).await;
    assert_eq!(buddy["rating"], 4.9);
    assert_eq!(buddy["totalEarnings"], 0.0);

    let response = send(&router, "POST", "/delivery-users/b9/earn", Some(json!({"amount": -5}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Valid amount is required");

    let buddy = body_json(
        send(
            &router,
            "POST",
            "/delivery-users/b9/earn",
            Some(json!({"amount": 30, "orderId": "o-1"})),
        )
        .await,
    )
    .await;
    assert_eq!(buddy["totalEarnings"], 30.0);
    assert_eq!(buddy["deliveries"][0]["orderId"], "o-1");
    assert_eq!(buddy["deliveries"][0]["date"], "2025-06-02");
}

#[tokio::test]
async fn test_canteen_create_then_upsert() {
    let harness = Harness::new();
    let router = harness.router();
    let mut canteen = json!({
        "name": "Canopy",
        "location": "Near TIFAC",
        "contactNumber": "9000000003",
        "operatingHours": {"mondayToFriday": "8am-8pm", "saturday": "9am-6pm", "sunday": "Closed"},
        "menu": [{"itemName": "Veg Burger", "price": 95, "category": "Snacks"}]
    });

    let response = send(&router, "POST", "/canteens", Some(canteen.clone())).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;

    canteen["id"] = created["id"].clone();
    canteen["location"] = json!("TIFAC Lobby");
    let response = send(&router, "POST", "/canteens", Some(canteen)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let listed = body_json(send(&router, "GET", "/canteens", None).await).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["location"], "TIFAC Lobby");

    let response = send(&router, "POST", "/canteens", Some(json!({"name": "No Menu"}))).await;
    assert_eq!(body_json(response).await["error"], "location is required");
}

#[tokio::test]
async fn test_quote_and_recommendations() {
    let harness = Harness::new();
    let router = harness.router();

    let quote = body_json(
        send(
            &router,
            "POST",
            "/quote",
            Some(json!({
                "canteenName": "Main Canteen",
                "dropLocation": "VKJ",
                "items": [{"name": "Chicken Biryani", "price": 180, "qty": 1}]
            })),
        )
        .await,
    )
    .await;
    assert_eq!(quote["subtotal"], 180.0);
    assert_eq!(quote["deliveryFee"], 34.0);
    assert_eq!(quote["totalAmount"], 214.0);

    let response = send(&router, "POST", "/recommendations", Some(json!({"message": "  "}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let reply = body_json(
        send(
            &router,
            "POST",
            "/recommendations",
            Some(json!({"message": "quick bite at VKJ in 5 min"})),
        )
        .await,
    )
    .await;
    assert_eq!(reply["request"]["mentionedLocation"], "vkj");
    assert_eq!(reply["request"]["timeConstraintMinutes"], 5);
}

#[tokio::test]
async fn test_metrics_without_recorder_is_not_found() {
    let harness = Harness::new();
    let response = send(&harness.router(), "GET", "/metrics", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
