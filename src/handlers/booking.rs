use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::availability::{parse_date, parse_time};
use crate::models::booking::validate_customer_name;
use crate::models::{Booking, DaySlot, Phone, SlotState};
use crate::services::ledger::{self, NewBooking, ReserveRequest};
use crate::services::{availability, verification};
use crate::state::AppState;

// POST /api/verification/request
#[derive(Deserialize)]
pub struct CodeRequest {
    #[serde(default, alias = "customer_phone")]
    pub phone: String,
}

pub async fn request_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CodeRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let now = state.config.local_now();
    verification::request_code(&state, &body.phone, now).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    #[serde(default, alias = "customer_name")]
    pub name: String,
    #[serde(default, alias = "customer_phone")]
    pub phone: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, alias = "booking_date")]
    pub date: String,
    #[serde(default, alias = "booking_time")]
    pub time: String,
}

/// Field validation shared by the customer and admin create paths.
pub(crate) fn new_booking(name: &str, phone: &str, date: &str, time: &str) -> Result<NewBooking, AppError> {
    Ok(NewBooking {
        customer_name: validate_customer_name(name)?,
        customer_phone: Phone::parse(phone)?,
        date: parse_date(date)?,
        time: parse_time(time)?,
    })
}

#[derive(Serialize)]
pub struct BookingEnvelope {
    pub booking: Booking,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingEnvelope>), AppError> {
    let booking = new_booking(&body.name, &body.phone, &body.date, &body.time)?;
    let req = ReserveRequest {
        booking,
        code: body.code.trim().to_string(),
    };

    let now = state.config.local_now();
    let booking = ledger::reserve(&state, req, now).await?;
    Ok((StatusCode::CREATED, Json(BookingEnvelope { booking })))
}

// GET /api/availability/:date
#[derive(Serialize)]
pub struct AvailabilityResponse {
    date: String,
    slots: Vec<DaySlot>,
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let date = parse_date(&date)?;
    let now = state.config.local_now();

    let slots = {
        let db = state.db()?;
        availability::day_slots(&db, &state.config, &date, &now)?
    };

    tracing::debug!(
        date = %date,
        open = slots.iter().filter(|s| s.state == SlotState::Open).count(),
        "availability served"
    );

    Ok(Json(AvailabilityResponse {
        date: date.to_string(),
        slots,
    }))
}
