use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::config::AppConfig;
use crate::db::queries;
use crate::models::{DaySlot, SlotState};

/// True when the whole day is blocked (weekly closing day or a day-level closure),
/// or, given a time, when that exact slot is closed.
pub fn is_closed(
    conn: &Connection,
    config: &AppConfig,
    date: &NaiveDate,
    time: Option<&NaiveTime>,
) -> anyhow::Result<bool> {
    if config.closed_weekdays.contains(&date.weekday()) {
        return Ok(true);
    }
    if queries::is_day_closed(conn, date)? {
        return Ok(true);
    }
    match time {
        Some(t) => queries::is_time_closed(conn, date, t),
        None => Ok(false),
    }
}

pub fn booked_times(conn: &Connection, date: &NaiveDate) -> anyhow::Result<BTreeSet<NaiveTime>> {
    Ok(queries::booked_times(conn, date)?.into_iter().collect())
}

/// A slot start is in the past once the business clock has moved beyond it.
pub fn is_past(date: &NaiveDate, time: &NaiveTime, now: &NaiveDateTime) -> bool {
    let today = now.date();
    *date < today || (*date == today && *time < now.time())
}

pub fn is_bookable(
    conn: &Connection,
    config: &AppConfig,
    date: &NaiveDate,
    time: &NaiveTime,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    if !config.slot_grid().contains(time) || is_past(date, time, now) {
        return Ok(false);
    }
    if is_closed(conn, config, date, Some(time))? {
        return Ok(false);
    }
    Ok(!booked_times(conn, date)?.contains(time))
}

/// The state of every grid slot on `date`, as shown to a customer picking a time.
pub fn day_slots(
    conn: &Connection,
    config: &AppConfig,
    date: &NaiveDate,
    now: &NaiveDateTime,
) -> anyhow::Result<Vec<DaySlot>> {
    let day_closed = is_closed(conn, config, date, None)?;
    let closed: BTreeSet<NaiveTime> = queries::closed_times(conn, date)?.into_iter().collect();
    let booked = booked_times(conn, date)?;

    let slots = config
        .slot_grid()
        .times()
        .into_iter()
        .map(|time| {
            let state = if booked.contains(&time) {
                SlotState::Booked
            } else if day_closed || closed.contains(&time) {
                SlotState::Closed
            } else if is_past(date, &time, now) {
                SlotState::Past
            } else {
                SlotState::Open
            };
            DaySlot { time, state }
        })
        .collect();

    Ok(slots)
}
