use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::booking::{new_booking, BookingEnvelope};
use crate::models::availability::{parse_date, parse_time};
use crate::models::booking::validate_customer_name;
use crate::models::{Booking, BookingPatch, ClosedSlot, Phone};
use crate::services::ledger;
use crate::services::reminders::{self, ReminderReport};
use crate::services::slot_control::{self, CloseOutcome};
use crate::state::AppState;

/// Bearer token check. No header is `Unauthorized`, a wrong token is `Forbidden`.
fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)?;

    if expected_token.is_empty() || token != expected_token {
        tracing::warn!("admin request with wrong token");
        return Err(AppError::Forbidden);
    }
    Ok(())
}

// POST /api/admin/bookings
#[derive(Deserialize)]
pub struct AdminBookingRequest {
    #[serde(default, alias = "customer_name")]
    pub name: String,
    #[serde(default, alias = "customer_phone")]
    pub phone: String,
    #[serde(default, alias = "booking_date")]
    pub date: String,
    #[serde(default, alias = "booking_time")]
    pub time: String,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AdminBookingRequest>,
) -> Result<(StatusCode, Json<BookingEnvelope>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let new = new_booking(&body.name, &body.phone, &body.date, &body.time)?;
    let booking = ledger::admin_reserve(&state, new, state.config.local_now()).await?;
    Ok((StatusCode::CREATED, Json(BookingEnvelope { booking })))
}

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub date: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let date = query.date.as_deref().map(parse_date).transpose()?;
    let limit = query.limit.unwrap_or(200).clamp(1, 1000);

    let bookings = {
        let db = state.db()?;
        crate::db::queries::list_bookings(&db, date.as_ref(), limit)?
    };
    Ok(Json(bookings))
}

// PATCH /api/admin/bookings/:id
#[derive(Deserialize)]
pub struct PatchBookingRequest {
    #[serde(alias = "customer_name")]
    pub name: Option<String>,
    #[serde(alias = "customer_phone")]
    pub phone: Option<String>,
    #[serde(alias = "booking_time")]
    pub time: Option<String>,
}

impl PatchBookingRequest {
    fn into_patch(self) -> Result<BookingPatch, AppError> {
        Ok(BookingPatch {
            customer_name: self.name.as_deref().map(validate_customer_name).transpose()?,
            customer_phone: self.phone.as_deref().map(Phone::parse).transpose()?,
            booking_time: self.time.as_deref().map(parse_time).transpose()?,
        })
    }
}

pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PatchBookingRequest>,
) -> Result<Json<BookingEnvelope>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let patch = body.into_patch()?;
    if patch.is_empty() {
        return Err(AppError::validation("body", "nothing to update"));
    }

    let booking = ledger::update(&state, &id, patch, state.config.local_now()).await?;
    Ok(Json(BookingEnvelope { booking }))
}

// DELETE /api/admin/bookings/:id
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    ledger::cancel(&state, &id).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

// POST /api/admin/slots/close
#[derive(Deserialize)]
pub struct CloseSlotRequest {
    #[serde(default)]
    pub date: String,
    pub time: Option<String>,
    pub reason: Option<String>,
}

pub async fn close_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CloseSlotRequest>,
) -> Result<(StatusCode, Json<CloseOutcome>), AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let date = parse_date(&body.date)?;
    let time = body
        .time
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(parse_time)
        .transpose()?;

    let outcome = {
        let db = state.db()?;
        slot_control::close_slot(&db, &state.config, date, time, body.reason, &state.config.local_now())?
    };
    Ok((StatusCode::CREATED, Json(outcome)))
}

// POST /api/admin/slots/open
#[derive(Deserialize)]
pub struct OpenSlotRequest {
    #[serde(default)]
    pub id: String,
}

pub async fn open_slot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<OpenSlotRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let removed = {
        let db = state.db()?;
        slot_control::open_slot(&db, body.id.trim())?
    };
    Ok(Json(serde_json::json!({"ok": true, "removed": removed})))
}

// GET /api/admin/slots/closed
#[derive(Deserialize)]
pub struct ClosedSlotsQuery {
    pub date: Option<String>,
}

pub async fn get_closed_slots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ClosedSlotsQuery>,
) -> Result<Json<Vec<ClosedSlot>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let date = query.date.as_deref().map(parse_date).transpose()?;
    let slots = {
        let db = state.db()?;
        slot_control::list_closed(&db, date.as_ref())?
    };
    Ok(Json(slots))
}

// POST /api/admin/reminders
pub async fn send_reminders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ReminderReport>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let report = reminders::send_reminders(&state, state.config.local_now()).await?;
    Ok(Json(report))
}
