pub mod admin;
pub mod booking;
pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/verification/request", post(booking::request_code))
        .route("/api/bookings", post(booking::create_booking))
        .route("/api/availability/:date", get(booking::get_availability))
        .route(
            "/api/admin/bookings",
            post(admin::create_booking).get(admin::get_bookings),
        )
        .route(
            "/api/admin/bookings/:id",
            patch(admin::update_booking).delete(admin::delete_booking),
        )
        .route("/api/admin/slots/close", post(admin::close_slot))
        .route("/api/admin/slots/open", post(admin::open_slot))
        .route("/api/admin/slots/closed", get(admin::get_closed_slots))
        .route("/api/admin/reminders", post(admin::send_reminders))
        .route("/webhook/sms", post(webhook::sms_webhook))
        .with_state(state)
}
