use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, ClosedSlot};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOutcome {
    pub slot: ClosedSlot,
    /// Confirmed bookings left standing inside the closed range.
    pub overlapping_bookings: Vec<Booking>,
}

/// Blocks one grid slot, or the whole day when `time` is `None`.
/// Existing bookings are never touched; they are reported back instead.
pub fn close_slot(
    conn: &Connection,
    config: &AppConfig,
    date: NaiveDate,
    time: Option<NaiveTime>,
    reason: Option<String>,
    now: &NaiveDateTime,
) -> Result<CloseOutcome, AppError> {
    if let Some(t) = &time {
        if !config.slot_grid().contains(t) {
            return Err(AppError::validation("time", "not a slot on the booking grid"));
        }
    }
    let reason = reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    let slot = ClosedSlot {
        id: uuid::Uuid::new_v4().to_string(),
        closed_date: date,
        closed_time: time,
        reason,
        created_at: *now,
    };
    queries::insert_closed_slot(conn, &slot)?;

    let overlapping_bookings = queries::confirmed_bookings_in_slot(conn, &date, time.as_ref())?;
    if !overlapping_bookings.is_empty() {
        tracing::warn!(
            closure_id = %slot.id,
            count = overlapping_bookings.len(),
            "closed range still holds confirmed bookings"
        );
    }
    tracing::info!(closure_id = %slot.id, date = %date, whole_day = slot.is_whole_day(), "slot closed");

    Ok(CloseOutcome {
        slot,
        overlapping_bookings,
    })
}

/// Removes a closure. Returns whether a row existed; a missing id is not an error.
pub fn open_slot(conn: &Connection, id: &str) -> Result<bool, AppError> {
    let removed = queries::delete_closed_slot(conn, id)?;
    tracing::info!(closure_id = %id, removed, "slot opened");
    Ok(removed)
}

pub fn list_closed(conn: &Connection, date: Option<&NaiveDate>) -> Result<Vec<ClosedSlot>, AppError> {
    Ok(queries::list_closed_slots(conn, date)?)
}
