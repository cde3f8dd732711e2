use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer};
use serde_json::json;

use super::domain::{AccountId, HoldId, HoldState, ListingId, RequesterDetails};
use super::repository::BookingRepository;
use super::service::{BookingService, CreateHoldRequest};
use crate::error::AppError;

/// Header carrying the authenticated caller's account id.
pub const ACCOUNT_HEADER: &str = "x-account-id";

/// Router builder exposing the booking lifecycle and the read-only views over it.
pub fn booking_router<R>(service: Arc<BookingService<R>>) -> Router
where
    R: BookingRepository + 'static,
{
    Router::new()
        .route("/api/v1/bookings", post(create_handler::<R>))
        .route("/api/v1/bookings/:hold_id", get(hold_handler::<R>))
        .route("/api/v1/bookings/:hold_id/confirm", post(confirm_handler::<R>))
        .route("/api/v1/bookings/:hold_id/cancel", post(cancel_handler::<R>))
        .route(
            "/api/v1/listings/:listing_id/moderate",
            post(moderate_handler::<R>),
        )
        .route("/api/v1/listings/:listing_id/quote", get(quote_handler::<R>))
        .route("/api/v1/trips", get(trips_handler::<R>))
        .route("/api/v1/landlord/bookings", get(landlord_bookings_handler::<R>))
        .route("/api/v1/landlord/listings", get(landlord_listings_handler::<R>))
        .with_state(service)
}

/// Booking request body. Requester details are sent inline next to the stay fields.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingBody {
    pub listing_id: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(deserialize_with = "clock_time")]
    pub check_in_time: NaiveTime,
    pub occupants: u32,
    #[serde(flatten)]
    pub requester: RequesterDetails,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<CreateBookingBody> for CreateHoldRequest {
    fn from(body: CreateBookingBody) -> Self {
        Self {
            listing_id: ListingId(body.listing_id),
            date_from: body.date_from,
            date_to: body.date_to,
            check_in_time: body.check_in_time,
            occupants: body.occupants,
            requester: body.requester,
            description: body.description.filter(|text| !text.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteParams {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

/// Accepts `HH:MM` as well as `HH:MM:SS`.
fn clock_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(&raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M"))
        .map_err(|_| serde::de::Error::custom(format!("invalid time '{raw}', expected HH:MM")))
}

fn caller(headers: &HeaderMap) -> Result<AccountId, Response> {
    headers
        .get(ACCOUNT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| AccountId(value.to_string()))
        .ok_or_else(|| {
            let payload = json!({
                "error": format!("missing {ACCOUNT_HEADER} header"),
                "kind": "unauthenticated",
            });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

fn failure(error: impl Into<AppError>) -> Response {
    error.into().into_response()
}

pub(crate) async fn create_handler<R>(
    State(service): State<Arc<BookingService<R>>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingBody>,
) -> Response
where
    R: BookingRepository + 'static,
{
    let caller = match caller(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    match service.create_hold(&caller, body.into()) {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn confirm_handler<R>(
    State(service): State<Arc<BookingService<R>>>,
    headers: HeaderMap,
    Path(hold_id): Path<String>,
) -> Response
where
    R: BookingRepository + 'static,
{
    let caller = match caller(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    match service.confirm_hold(&caller, &HoldId(hold_id)) {
        Ok(outcome) => {
            let payload = json!({
                "hold_id": outcome.hold_id,
                "state": HoldState::Confirmed.label(),
                "cancelled_competitors": outcome.cancelled_competitors,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => failure(error),
    }
}

pub(crate) async fn cancel_handler<R>(
    State(service): State<Arc<BookingService<R>>>,
    headers: HeaderMap,
    Path(hold_id): Path<String>,
) -> Response
where
    R: BookingRepository + 'static,
{
    let caller = match caller(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let hold_id = HoldId(hold_id);
    match service.cancel_hold(&caller, &hold_id) {
        Ok(cancelled_by) => {
            let payload = json!({
                "hold_id": hold_id,
                "cancelled_by": cancelled_by,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => failure(error),
    }
}

pub(crate) async fn moderate_handler<R>(
    State(service): State<Arc<BookingService<R>>>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
) -> Response
where
    R: BookingRepository + 'static,
{
    let caller = match caller(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let listing_id = ListingId(listing_id);
    match service.moderate_listing(&caller, &listing_id) {
        Ok(()) => {
            let payload = json!({ "listing_id": listing_id, "moderated": true });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => failure(error),
    }
}

pub(crate) async fn hold_handler<R>(
    State(service): State<Arc<BookingService<R>>>,
    headers: HeaderMap,
    Path(hold_id): Path<String>,
) -> Response
where
    R: BookingRepository + 'static,
{
    let caller = match caller(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    match service.hold(&caller, &HoldId(hold_id)) {
        Ok(hold) => (StatusCode::OK, Json(hold)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn quote_handler<R>(
    State(service): State<Arc<BookingService<R>>>,
    Path(listing_id): Path<String>,
    Query(params): Query<QuoteParams>,
) -> Response
where
    R: BookingRepository + 'static,
{
    match service.quote(&ListingId(listing_id), params.date_from, params.date_to) {
        Ok(quote) => (StatusCode::OK, Json(quote)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn trips_handler<R>(
    State(service): State<Arc<BookingService<R>>>,
    headers: HeaderMap,
) -> Response
where
    R: BookingRepository + 'static,
{
    let caller = match caller(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    match service.trips(&caller) {
        Ok(trips) => (StatusCode::OK, Json(trips)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn landlord_bookings_handler<R>(
    State(service): State<Arc<BookingService<R>>>,
    headers: HeaderMap,
) -> Response
where
    R: BookingRepository + 'static,
{
    let caller = match caller(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    match service.landlord_bookings(&caller) {
        Ok(bookings) => (StatusCode::OK, Json(bookings)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn landlord_listings_handler<R>(
    State(service): State<Arc<BookingService<R>>>,
    headers: HeaderMap,
) -> Response
where
    R: BookingRepository + 'static,
{
    let caller = match caller(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    match service.landlord_listings(&caller) {
        Ok(listings) => (StatusCode::OK, Json(listings)).into_response(),
        Err(error) => failure(error),
    }
}
