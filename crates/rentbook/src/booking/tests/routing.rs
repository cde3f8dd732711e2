use super::common::*;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::booking::repository::RepositoryError;
use crate::booking::router::{booking_router, ACCOUNT_HEADER};

fn json_request(method: Method, uri: &str, caller: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(caller) = caller {
        builder = builder.header(ACCOUNT_HEADER, caller);
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).expect("serializable")))
        .expect("request builds")
}

fn empty_request(method: Method, uri: &str, caller: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header(ACCOUNT_HEADER, caller);
    }
    builder.body(Body::empty()).expect("request builds")
}

fn booking_body(requester: &str, from: &str, to: &str) -> Value {
    let details = profile(requester);
    json!({
        "listing_id": LISTING,
        "date_from": from,
        "date_to": to,
        "check_in_time": "15:00",
        "occupants": 2,
        "first_name": details.first_name,
        "last_name": details.last_name,
        "email": details.email,
        "phone": details.phone,
    })
}

#[tokio::test]
async fn create_route_returns_receipt() {
    let market = marketplace();
    let router = booking_router(market.service.clone());

    let response = router
        .oneshot(json_request(
            Method::POST,
            "/api/v1/bookings",
            Some(TENANT_A),
            booking_body(TENANT_A, "2025-06-01", "2025-06-03"),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["total_price"], "300");
    assert_eq!(payload["rental_type"], "per-day");
    assert!(payload["hold_id"].as_str().is_some());
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let market = marketplace();
    let router = booking_router(market.service.clone());

    let response = router
        .oneshot(json_request(
            Method::POST,
            "/api/v1/bookings",
            None,
            booking_body(TENANT_A, "2025-06-01", "2025-06-03"),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn domain_errors_map_to_status_codes() {
    let market = marketplace();
    let router = booking_router(market.service.clone());

    let mismatch = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/bookings",
            Some(TENANT_B),
            booking_body(TENANT_A, "2025-06-01", "2025-06-03"),
        ))
        .await
        .expect("route executes");
    assert_eq!(mismatch.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(mismatch).await;
    assert_eq!(payload["kind"], "validation");

    let broke = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/bookings",
            Some(TENANT_A),
            booking_body(TENANT_A, "2025-06-01", "2025-06-30"),
        ))
        .await
        .expect("route executes");
    assert_eq!(broke.status(), StatusCode::PAYMENT_REQUIRED);

    let unknown = router
        .clone()
        .oneshot(empty_request(
            Method::POST,
            "/api/v1/bookings/hold-999999/confirm",
            Some(OWNER),
        ))
        .await
        .expect("route executes");
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let not_admin = router
        .oneshot(empty_request(
            Method::POST,
            "/api/v1/listings/listing-1/moderate",
            Some(TENANT_A),
        ))
        .await
        .expect("route executes");
    assert_eq!(not_admin.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn confirm_then_cancel_reports_state_error() {
    let market = marketplace();
    let receipt = market
        .service
        .create_hold(
            &crate::booking::AccountId(TENANT_A.to_string()),
            stay_request(TENANT_A, 1, 3),
        )
        .expect("hold");
    let router = booking_router(market.service.clone());

    let confirm = router
        .clone()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/bookings/{}/confirm", receipt.hold_id),
            Some(OWNER),
        ))
        .await
        .expect("route executes");
    assert_eq!(confirm.status(), StatusCode::OK);
    let payload = read_json_body(confirm).await;
    assert_eq!(payload["state"], "confirmed");

    let cancel = router
        .clone()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/bookings/{}/cancel", receipt.hold_id),
            Some(TENANT_A),
        ))
        .await
        .expect("route executes");
    assert_eq!(cancel.status(), StatusCode::CONFLICT);
    let payload = read_json_body(cancel).await;
    assert_eq!(payload["kind"], "state");

    let trips = router
        .oneshot(empty_request(Method::GET, "/api/v1/trips", Some(TENANT_A)))
        .await
        .expect("route executes");
    assert_eq!(trips.status(), StatusCode::OK);
    let payload = read_json_body(trips).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn cancel_route_names_the_cancelling_party() {
    let market = marketplace();
    let receipt = market
        .service
        .create_hold(
            &crate::booking::AccountId(TENANT_B.to_string()),
            stay_request(TENANT_B, 1, 3),
        )
        .expect("hold");
    let router = booking_router(market.service.clone());

    let response = router
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/bookings/{}/cancel", receipt.hold_id),
            Some(OWNER),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["cancelled_by"], "owner");
}

#[tokio::test]
async fn quote_route_prices_weekly_stays() {
    let market = marketplace();
    let router = booking_router(market.service.clone());

    let response = router
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/listings/listing-1/quote?date_from=2024-01-01&date_to=2024-01-10",
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["quote"]["total"], "1000");
    assert_eq!(payload["quote"]["tier"], "per-week");
    assert_eq!(payload["rental_types"], json!(["per-week", "per-day"]));
}

#[tokio::test]
async fn unavailable_storage_maps_to_service_unavailable() {
    let (service, _) = flaky_service(
        1,
        RepositoryError::Unavailable("storage offline".to_string()),
    );
    let router = booking_router(service);

    let response = router
        .oneshot(json_request(
            Method::POST,
            "/api/v1/bookings",
            Some(TENANT_A),
            booking_body(TENANT_A, "2025-06-01", "2025-06-03"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], "unavailable");
}
