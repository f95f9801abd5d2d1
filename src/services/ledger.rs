//! The booking ledger: the only writer of booking rows.
//!
//! Every claim on a slot goes through [`claim_slot`] inside an `IMMEDIATE`
//! transaction. The partial unique index `bookings_active_slot` is what finally
//! arbitrates two writers that both passed the availability read, so the check
//! and the insert behave as one step even across connections.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, TransactionBehavior};

use crate::config::AppConfig;
use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{Booking, BookingPatch, BookingStatus, Phone};
use crate::services::notifications::{self, Notice};
use crate::services::{availability, verification};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub customer_name: String,
    pub customer_phone: Phone,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub booking: NewBooking,
    pub code: String,
}

/// Result of a customer cancelling by SMS reply.
#[derive(Debug, Clone)]
pub enum ReplyCancel {
    NoBooking,
    TooLate(Booking),
    Cancelled { booking: Booking, remaining: usize },
}

/// Availability re-check and insert. Must run inside the caller's transaction.
fn claim_slot(
    conn: &Connection,
    config: &AppConfig,
    new: &NewBooking,
    now: &NaiveDateTime,
) -> Result<Booking, AppError> {
    if queries::find_confirmed_at(conn, &new.date, &new.time)?.is_some() {
        return Err(AppError::SlotTaken);
    }
    if availability::is_closed(conn, config, &new.date, Some(&new.time))? {
        return Err(AppError::SlotClosed);
    }

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        customer_name: new.customer_name.clone(),
        customer_phone: new.customer_phone.clone(),
        booking_date: new.date,
        booking_time: new.time,
        status: BookingStatus::Confirmed,
        reminder_sent: false,
        created_at: *now,
        updated_at: *now,
    };

    queries::insert_booking(conn, &booking).map_err(slot_conflict)?;
    Ok(booking)
}

/// Maps a lost race on the active-slot index to `SlotTaken`.
fn slot_conflict(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(e) if db::is_unique_violation(e) => AppError::SlotTaken,
        _ => AppError::Internal(err),
    }
}

fn ensure_on_grid(config: &AppConfig, time: &NaiveTime) -> Result<(), AppError> {
    if config.slot_grid().contains(time) {
        Ok(())
    } else {
        Err(AppError::validation("booking_time", "not a bookable slot"))
    }
}

/// Consumes the verification code and claims the slot as one transaction.
/// A rejected claim rolls back, leaving the code usable for another slot.
pub fn reserve_verified(
    conn: &mut Connection,
    config: &AppConfig,
    req: &ReserveRequest,
    now: &NaiveDateTime,
) -> Result<Booking, AppError> {
    ensure_on_grid(config, &req.booking.time)?;
    if availability::is_past(&req.booking.date, &req.booking.time, now) {
        return Err(AppError::validation("booking_time", "that time has already passed"));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    verification::verify(&tx, &req.booking.customer_phone, &req.code, now)?;
    let booking = claim_slot(&tx, config, &req.booking, now)?;
    tx.commit()?;
    Ok(booking)
}

pub fn reserve_unverified(
    conn: &mut Connection,
    config: &AppConfig,
    new: &NewBooking,
    now: &NaiveDateTime,
) -> Result<Booking, AppError> {
    ensure_on_grid(config, &new.time)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let booking = claim_slot(&tx, config, new, now)?;
    tx.commit()?;
    Ok(booking)
}

/// Applies `patch`. A new time goes through the same slot checks as a fresh claim.
pub fn apply_patch(
    conn: &mut Connection,
    config: &AppConfig,
    id: &str,
    patch: &BookingPatch,
    now: &NaiveDateTime,
) -> Result<Booking, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut booking = queries::get_booking_by_id(&tx, id)?.ok_or(AppError::NotFound)?;

    if let Some(time) = patch.booking_time {
        if time != booking.booking_time {
            ensure_on_grid(config, &time)?;
            if queries::find_confirmed_at(&tx, &booking.booking_date, &time)?.is_some() {
                return Err(AppError::SlotTaken);
            }
            if availability::is_closed(&tx, config, &booking.booking_date, Some(&time))? {
                return Err(AppError::SlotClosed);
            }
            booking.booking_time = time;
        }
    }
    if let Some(name) = &patch.customer_name {
        booking.customer_name = name.clone();
    }
    if let Some(phone) = &patch.customer_phone {
        booking.customer_phone = phone.clone();
    }
    booking.updated_at = *now;

    queries::update_booking_fields(&tx, &booking).map_err(slot_conflict)?;
    tx.commit()?;
    Ok(booking)
}

/// Hard-deletes the booking, returning the removed row.
pub fn remove(conn: &mut Connection, id: &str) -> Result<Booking, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let booking = queries::get_booking_by_id(&tx, id)?.ok_or(AppError::NotFound)?;
    queries::delete_booking(&tx, id)?;
    tx.commit()?;
    Ok(booking)
}

/// Cancels the phone's nearest booking that has not started yet, unless it starts
/// within `min_cancel_hours`. Lookup, notice check and delete share one transaction.
pub fn cancel_nearest_for_phone(
    conn: &mut Connection,
    config: &AppConfig,
    phone: &Phone,
    now: &NaiveDateTime,
) -> Result<ReplyCancel, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let upcoming: Vec<Booking> = queries::upcoming_bookings_for_phone(&tx, phone, &now.date())?
        .into_iter()
        .filter(|b| b.starts_at() > *now)
        .collect();

    let Some(nearest) = upcoming.first() else {
        return Ok(ReplyCancel::NoBooking);
    };
    if nearest.starts_at() - *now < Duration::hours(config.min_cancel_hours) {
        return Ok(ReplyCancel::TooLate(nearest.clone()));
    }

    queries::delete_booking(&tx, &nearest.id)?;
    tx.commit()?;
    Ok(ReplyCancel::Cancelled {
        booking: nearest.clone(),
        remaining: upcoming.len() - 1,
    })
}

// ── Entry points: commit first, then notify ──

pub async fn reserve(
    state: &Arc<AppState>,
    req: ReserveRequest,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let booking = {
        let mut db = state.db()?;
        reserve_verified(&mut db, &state.config, &req, &now)?
    };

    tracing::info!(
        booking_id = %booking.id,
        date = %booking.booking_date,
        time = %booking.booking_time,
        phone = %booking.customer_phone.masked(),
        "booking reserved"
    );
    notifications::dispatch_in_background(
        state,
        booking.customer_phone.clone(),
        Notice::confirmation(&booking),
    );
    Ok(booking)
}

pub async fn admin_reserve(
    state: &Arc<AppState>,
    new: NewBooking,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let booking = {
        let mut db = state.db()?;
        reserve_unverified(&mut db, &state.config, &new, &now)?
    };

    tracing::info!(booking_id = %booking.id, "booking created by admin");
    notifications::dispatch_in_background(
        state,
        booking.customer_phone.clone(),
        Notice::confirmation(&booking),
    );
    Ok(booking)
}

pub async fn update(
    state: &Arc<AppState>,
    id: &str,
    patch: BookingPatch,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let booking = {
        let mut db = state.db()?;
        apply_patch(&mut db, &state.config, id, &patch, &now)?
    };

    tracing::info!(booking_id = %booking.id, "booking updated");
    notifications::dispatch_in_background(
        state,
        booking.customer_phone.clone(),
        Notice::updated(&booking),
    );
    Ok(booking)
}

pub async fn cancel(state: &Arc<AppState>, id: &str) -> Result<Booking, AppError> {
    let booking = {
        let mut db = state.db()?;
        remove(&mut db, id)?
    };

    tracing::info!(booking_id = %booking.id, "booking cancelled");
    notifications::dispatch_in_background(
        state,
        booking.customer_phone.clone(),
        Notice::cancelled(&booking),
    );
    Ok(booking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClosedSlot;

    fn config() -> AppConfig {
        let mut config = AppConfig::from_env();
        config.opening_hour = 10;
        config.closing_hour = 17;
        config.slot_minutes = 40;
        config.closed_weekdays = vec![];
        config
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn new_booking(phone: &str, date: &str, time: &str) -> NewBooking {
        NewBooking {
            customer_name: "Dana".to_string(),
            customer_phone: Phone::parse(phone).unwrap(),
            date: d(date),
            time: t(time),
        }
    }

    fn with_code(conn: &Connection, new: NewBooking, code: &str) -> ReserveRequest {
        queries::insert_code(conn, &new.customer_phone, code, &dt("2025-03-09 10:00")).unwrap();
        ReserveRequest {
            booking: new,
            code: code.to_string(),
        }
    }

    fn close_day(conn: &Connection, date: &str) {
        queries::insert_closed_slot(
            conn,
            &ClosedSlot {
                id: "closed".to_string(),
                closed_date: d(date),
                closed_time: None,
                reason: None,
                created_at: dt("2025-03-01 09:00"),
            },
        )
        .unwrap();
    }

    const NOW: &str = "2025-03-09 09:00";

    #[test]
    fn test_reserve_confirms_and_consumes_code() {
        let mut conn = db::init_db(":memory:").unwrap();
        let req = with_code(&conn, new_booking("0501234567", "2025-03-10", "10:00"), "123456");

        let booking = reserve_verified(&mut conn, &config(), &req, &dt(NOW)).unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.booking_time, t("10:00"));

        let mut again = req.clone();
        again.booking.time = t("10:40");
        assert!(matches!(
            reserve_verified(&mut conn, &config(), &again, &dt(NOW)),
            Err(AppError::BadCode)
        ));
    }

    #[test]
    fn test_reserve_taken_slot() {
        let mut conn = db::init_db(":memory:").unwrap();
        let first = with_code(&conn, new_booking("0501234567", "2025-03-10", "11:20"), "111111");
        reserve_verified(&mut conn, &config(), &first, &dt(NOW)).unwrap();

        let second = with_code(&conn, new_booking("0527654321", "2025-03-10", "11:20"), "222222");
        assert!(matches!(
            reserve_verified(&mut conn, &config(), &second, &dt(NOW)),
            Err(AppError::SlotTaken)
        ));
    }

    #[test]
    fn test_rejected_claim_keeps_code_usable() {
        let mut conn = db::init_db(":memory:").unwrap();
        let first = with_code(&conn, new_booking("0501234567", "2025-03-10", "11:20"), "111111");
        reserve_verified(&mut conn, &config(), &first, &dt(NOW)).unwrap();

        let mut second = with_code(&conn, new_booking("0527654321", "2025-03-10", "11:20"), "222222");
        assert!(reserve_verified(&mut conn, &config(), &second, &dt(NOW)).is_err());

        second.booking.time = t("12:00");
        assert!(reserve_verified(&mut conn, &config(), &second, &dt(NOW)).is_ok());
    }

    #[test]
    fn test_reserve_closed_day() {
        let mut conn = db::init_db(":memory:").unwrap();
        close_day(&conn, "2025-03-10");

        for time in ["10:00", "13:20", "16:40"] {
            let req = with_code(&conn, new_booking("0501234567", "2025-03-10", time), "123456");
            assert!(matches!(
                reserve_verified(&mut conn, &config(), &req, &dt(NOW)),
                Err(AppError::SlotClosed)
            ));
        }
    }

    #[test]
    fn test_bad_code_checked_before_slot() {
        let mut conn = db::init_db(":memory:").unwrap();
        close_day(&conn, "2025-03-10");
        let req = ReserveRequest {
            booking: new_booking("0501234567", "2025-03-10", "10:00"),
            code: "999999".to_string(),
        };
        assert!(matches!(
            reserve_verified(&mut conn, &config(), &req, &dt(NOW)),
            Err(AppError::BadCode)
        ));
    }

    #[test]
    fn test_reserve_rejects_off_grid_and_past() {
        let mut conn = db::init_db(":memory:").unwrap();
        let off_grid = with_code(&conn, new_booking("0501234567", "2025-03-10", "09:40"), "123456");
        assert!(matches!(
            reserve_verified(&mut conn, &config(), &off_grid, &dt(NOW)),
            Err(AppError::ValidationFailed { .. })
        ));

        let past = with_code(&conn, new_booking("0501234567", "2025-03-09", "08:00"), "123456");
        assert!(matches!(
            reserve_verified(&mut conn, &config(), &past, &dt(NOW)),
            Err(AppError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_unverified_reserve_enforces_uniqueness() {
        let mut conn = db::init_db(":memory:").unwrap();
        let new = new_booking("0501234567", "2025-03-10", "10:00");
        reserve_unverified(&mut conn, &config(), &new, &dt(NOW)).unwrap();
        assert!(matches!(
            reserve_unverified(&mut conn, &config(), &new, &dt(NOW)),
            Err(AppError::SlotTaken)
        ));
    }

    #[test]
    fn test_read_then_write_race_is_caught_by_index() {
        let path = std::env::temp_dir().join(format!("slotbook-race-{}.db", uuid::Uuid::new_v4()));
        let path_str = path.to_string_lossy().to_string();
        let a = db::init_db(&path_str).unwrap();
        let b = db::init_db(&path_str).unwrap();
        let now = dt(NOW);

        // both writers pass the availability read before either commits
        let date = d("2025-03-10");
        let time = t("10:00");
        assert!(queries::find_confirmed_at(&a, &date, &time).unwrap().is_none());
        assert!(queries::find_confirmed_at(&b, &date, &time).unwrap().is_none());

        let first = Booking {
            id: "a".to_string(),
            customer_name: "A".to_string(),
            customer_phone: Phone::parse("0501234567").unwrap(),
            booking_date: date,
            booking_time: time,
            status: BookingStatus::Confirmed,
            reminder_sent: false,
            created_at: now,
            updated_at: now,
        };
        queries::insert_booking(&a, &first).unwrap();

        let mut second = first.clone();
        second.id = "b".to_string();
        let err = queries::insert_booking(&b, &second).unwrap_err();
        assert!(matches!(slot_conflict(err), AppError::SlotTaken));

        drop(a);
        drop(b);
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{path_str}{suffix}"));
        }
    }

    #[test]
    fn test_patch_revalidates_new_time() {
        let mut conn = db::init_db(":memory:").unwrap();
        let cfg = config();
        let a = reserve_unverified(&mut conn, &cfg, &new_booking("0501234567", "2025-03-10", "10:00"), &dt(NOW)).unwrap();
        reserve_unverified(&mut conn, &cfg, &new_booking("0527654321", "2025-03-10", "10:40"), &dt(NOW)).unwrap();

        let onto_taken = BookingPatch {
            booking_time: Some(t("10:40")),
            ..Default::default()
        };
        assert!(matches!(
            apply_patch(&mut conn, &cfg, &a.id, &onto_taken, &dt(NOW)),
            Err(AppError::SlotTaken)
        ));

        let off_grid = BookingPatch {
            booking_time: Some(t("10:30")),
            ..Default::default()
        };
        assert!(matches!(
            apply_patch(&mut conn, &cfg, &a.id, &off_grid, &dt(NOW)),
            Err(AppError::ValidationFailed { .. })
        ));

        let moved = apply_patch(
            &mut conn,
            &cfg,
            &a.id,
            &BookingPatch {
                customer_name: Some("Dana Levi".to_string()),
                booking_time: Some(t("12:00")),
                ..Default::default()
            },
            &dt("2025-03-09 09:30"),
        )
        .unwrap();
        assert_eq!(moved.booking_time, t("12:00"));
        assert_eq!(moved.customer_name, "Dana Levi");
        assert_eq!(moved.updated_at, dt("2025-03-09 09:30"));

        let times = availability::booked_times(&conn, &d("2025-03-10")).unwrap();
        assert!(times.contains(&t("12:00")));
        assert!(!times.contains(&t("10:00")));
    }

    #[test]
    fn test_patch_same_time_is_not_a_conflict() {
        let mut conn = db::init_db(":memory:").unwrap();
        let cfg = config();
        let a = reserve_unverified(&mut conn, &cfg, &new_booking("0501234567", "2025-03-10", "10:00"), &dt(NOW)).unwrap();

        let patch = BookingPatch {
            booking_time: Some(t("10:00")),
            customer_phone: Some(Phone::parse("0527654321").unwrap()),
            ..Default::default()
        };
        let updated = apply_patch(&mut conn, &cfg, &a.id, &patch, &dt(NOW)).unwrap();
        assert_eq!(updated.customer_phone.to_local(), "0527654321");
    }

    #[test]
    fn test_patch_and_remove_missing_booking() {
        let mut conn = db::init_db(":memory:").unwrap();
        assert!(matches!(
            apply_patch(&mut conn, &config(), "missing", &BookingPatch::default(), &dt(NOW)),
            Err(AppError::NotFound)
        ));
        assert!(matches!(remove(&mut conn, "missing"), Err(AppError::NotFound)));
    }

    #[test]
    fn test_remove_frees_slot() {
        let mut conn = db::init_db(":memory:").unwrap();
        let cfg = config();
        let new = new_booking("0501234567", "2025-03-10", "10:00");
        let booking = reserve_unverified(&mut conn, &cfg, &new, &dt(NOW)).unwrap();

        let removed = remove(&mut conn, &booking.id).unwrap();
        assert_eq!(removed.id, booking.id);
        assert!(queries::get_booking_by_id(&conn, &booking.id).unwrap().is_none());
        assert!(reserve_unverified(&mut conn, &cfg, &new, &dt(NOW)).is_ok());
    }

    #[test]
    fn test_reply_cancel_checks_notice_on_current_row() {
        let mut conn = db::init_db(":memory:").unwrap();
        let cfg = config();
        let now = dt("2025-03-10 10:00");
        let booking = reserve_unverified(&mut conn, &cfg, &new_booking("0501234567", "2025-03-10", "15:20"), &now).unwrap();

        // moved to within the notice window after the customer saw their booking
        let moved = BookingPatch {
            booking_time: Some(t("12:00")),
            ..Default::default()
        };
        apply_patch(&mut conn, &cfg, &booking.id, &moved, &now).unwrap();

        let phone = Phone::parse("0501234567").unwrap();
        match cancel_nearest_for_phone(&mut conn, &cfg, &phone, &now).unwrap() {
            ReplyCancel::TooLate(b) => assert_eq!(b.booking_time, t("12:00")),
            other => panic!("expected TooLate, got {other:?}"),
        }
        assert!(queries::get_booking_by_id(&conn, &booking.id).unwrap().is_some());
    }

    #[test]
    fn test_reply_cancel_removes_nearest_and_counts_rest() {
        let mut conn = db::init_db(":memory:").unwrap();
        let cfg = config();
        let now = dt("2025-03-10 10:00");
        let later = reserve_unverified(&mut conn, &cfg, &new_booking("0501234567", "2025-03-12", "10:00"), &now).unwrap();
        let nearest = reserve_unverified(&mut conn, &cfg, &new_booking("0501234567", "2025-03-11", "10:00"), &now).unwrap();

        let phone = Phone::parse("0501234567").unwrap();
        match cancel_nearest_for_phone(&mut conn, &cfg, &phone, &now).unwrap() {
            ReplyCancel::Cancelled { booking, remaining } => {
                assert_eq!(booking.id, nearest.id);
                assert_eq!(remaining, 1);
            }
            other => panic!("expected Cancelled, got {other:?}"),
        }
        assert!(queries::get_booking_by_id(&conn, &nearest.id).unwrap().is_none());
        assert!(queries::get_booking_by_id(&conn, &later.id).unwrap().is_some());
    }

    #[test]
    fn test_reply_cancel_without_bookings() {
        let mut conn = db::init_db(":memory:").unwrap();
        let phone = Phone::parse("0501234567").unwrap();
        assert!(matches!(
            cancel_nearest_for_phone(&mut conn, &config(), &phone, &dt(NOW)).unwrap(),
            ReplyCancel::NoBooking
        ));
    }
}
