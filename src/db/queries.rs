use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::availability::{DATE_FORMAT, TIME_FORMAT};
use crate::models::{Booking, BookingStatus, ClosedSlot, Phone};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BOOKING_COLUMNS: &str = "id, customer_name, customer_phone, booking_date, booking_time, \
                               status, reminder_sent, created_at, updated_at";

fn ts(dt: &NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

fn date_str(d: &NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

fn time_str(t: &NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

// ── Bookings ──

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, customer_name, customer_phone, booking_date, booking_time, status, reminder_sent, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            booking.id,
            booking.customer_name,
            booking.customer_phone.as_str(),
            date_str(&booking.booking_date),
            time_str(&booking.booking_time),
            booking.status.as_str(),
            booking.reminder_sent as i32,
            ts(&booking.created_at),
            ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id], |row| Ok(parse_booking_row(row)))
        .optional()?;
    row.transpose()
}

pub fn find_confirmed_at(
    conn: &Connection,
    date: &NaiveDate,
    time: &NaiveTime,
) -> anyhow::Result<Option<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE booking_date = ?1 AND booking_time = ?2 AND status = 'confirmed'"
    );
    let row = conn
        .query_row(&sql, params![date_str(date), time_str(time)], |row| {
            Ok(parse_booking_row(row))
        })
        .optional()?;
    row.transpose()
}

pub fn booked_times(conn: &Connection, date: &NaiveDate) -> anyhow::Result<Vec<NaiveTime>> {
    let mut stmt = conn.prepare(
        "SELECT booking_time FROM bookings
         WHERE booking_date = ?1 AND status = 'confirmed' ORDER BY booking_time ASC",
    )?;
    let rows = stmt.query_map(params![date_str(date)], |row| row.get::<_, String>(0))?;

    let mut times = vec![];
    for row in rows {
        let raw = row?;
        times.push(
            NaiveTime::parse_from_str(&raw, TIME_FORMAT)
                .with_context(|| format!("malformed booking_time in database: {raw}"))?,
        );
    }
    Ok(times)
}

pub fn list_bookings(
    conn: &Connection,
    date: Option<&NaiveDate>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    match date {
        Some(d) => {
            let sql = format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_date = ?1
                 ORDER BY booking_date ASC, booking_time ASC LIMIT ?2"
            );
            collect_bookings(conn, &sql, params![date_str(d), limit])
        }
        None => {
            let sql = format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 ORDER BY booking_date ASC, booking_time ASC LIMIT ?1"
            );
            collect_bookings(conn, &sql, params![limit])
        }
    }
}

/// Confirmed bookings for `phone` dated `from` or later, nearest first.
pub fn upcoming_bookings_for_phone(
    conn: &Connection,
    phone: &Phone,
    from: &NaiveDate,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE customer_phone = ?1 AND booking_date >= ?2 AND status = 'confirmed'
         ORDER BY booking_date ASC, booking_time ASC"
    );
    collect_bookings(conn, &sql, params![phone.as_str(), date_str(from)])
}

pub fn confirmed_bookings_in_slot(
    conn: &Connection,
    date: &NaiveDate,
    time: Option<&NaiveTime>,
) -> anyhow::Result<Vec<Booking>> {
    match time {
        Some(t) => {
            let sql = format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 WHERE booking_date = ?1 AND booking_time = ?2 AND status = 'confirmed'"
            );
            collect_bookings(conn, &sql, params![date_str(date), time_str(t)])
        }
        None => {
            let sql = format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings
                 WHERE booking_date = ?1 AND status = 'confirmed' ORDER BY booking_time ASC"
            );
            collect_bookings(conn, &sql, params![date_str(date)])
        }
    }
}

pub fn bookings_due_reminder(conn: &Connection, date: &NaiveDate) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE booking_date = ?1 AND status = 'confirmed' AND reminder_sent = 0
         ORDER BY booking_time ASC"
    );
    collect_bookings(conn, &sql, params![date_str(date)])
}

pub fn mark_reminder_sent(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET reminder_sent = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(count > 0)
}

/// Writes the editable fields of `booking` back to its row.
pub fn update_booking_fields(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET customer_name = ?1, customer_phone = ?2, booking_time = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            booking.customer_name,
            booking.customer_phone.as_str(),
            time_str(&booking.booking_time),
            ts(&booking.updated_at),
            booking.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn delete_booking(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM bookings WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

fn collect_bookings(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let id: String = row.get(0)?;
    let customer_name: String = row.get(1)?;
    let customer_phone: String = row.get(2)?;
    let booking_date: String = row.get(3)?;
    let booking_time: String = row.get(4)?;
    let status: String = row.get(5)?;
    let reminder_sent: bool = row.get::<_, i32>(6)? != 0;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    Ok(Booking {
        customer_name,
        customer_phone: Phone::from_canonical(customer_phone),
        booking_date: NaiveDate::parse_from_str(&booking_date, DATE_FORMAT)
            .with_context(|| format!("malformed booking_date for {id}"))?,
        booking_time: NaiveTime::parse_from_str(&booking_time, TIME_FORMAT)
            .with_context(|| format!("malformed booking_time for {id}"))?,
        status: BookingStatus::parse(&status),
        reminder_sent,
        created_at: NaiveDateTime::parse_from_str(&created_at, TIMESTAMP_FORMAT)
            .with_context(|| format!("malformed created_at for {id}"))?,
        updated_at: NaiveDateTime::parse_from_str(&updated_at, TIMESTAMP_FORMAT)
            .with_context(|| format!("malformed updated_at for {id}"))?,
        id,
    })
}

// ── Closed Slots ──

pub fn insert_closed_slot(conn: &Connection, slot: &ClosedSlot) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO closed_slots (id, closed_date, closed_time, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            slot.id,
            date_str(&slot.closed_date),
            slot.closed_time.as_ref().map(time_str),
            slot.reason,
            ts(&slot.created_at),
        ],
    )?;
    Ok(())
}

pub fn delete_closed_slot(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM closed_slots WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

pub fn list_closed_slots(
    conn: &Connection,
    date: Option<&NaiveDate>,
) -> anyhow::Result<Vec<ClosedSlot>> {
    match date {
        Some(d) => collect_closed_slots(
            conn,
            "SELECT id, closed_date, closed_time, reason, created_at FROM closed_slots
             WHERE closed_date = ?1 ORDER BY closed_date ASC, closed_time ASC",
            params![date_str(d)],
        ),
        None => collect_closed_slots(
            conn,
            "SELECT id, closed_date, closed_time, reason, created_at FROM closed_slots
             ORDER BY closed_date ASC, closed_time ASC",
            [],
        ),
    }
}

pub fn is_day_closed(conn: &Connection, date: &NaiveDate) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM closed_slots WHERE closed_date = ?1 AND closed_time IS NULL",
        params![date_str(date)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn is_time_closed(conn: &Connection, date: &NaiveDate, time: &NaiveTime) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM closed_slots WHERE closed_date = ?1 AND closed_time = ?2",
        params![date_str(date), time_str(time)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn closed_times(conn: &Connection, date: &NaiveDate) -> anyhow::Result<Vec<NaiveTime>> {
    let mut stmt = conn.prepare(
        "SELECT closed_time FROM closed_slots WHERE closed_date = ?1 AND closed_time IS NOT NULL",
    )?;
    let rows = stmt.query_map(params![date_str(date)], |row| row.get::<_, String>(0))?;

    let mut times = vec![];
    for row in rows {
        let raw = row?;
        times.push(
            NaiveTime::parse_from_str(&raw, TIME_FORMAT)
                .with_context(|| format!("malformed closed_time in database: {raw}"))?,
        );
    }
    Ok(times)
}

fn collect_closed_slots(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> anyhow::Result<Vec<ClosedSlot>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok(parse_closed_slot_row(row)))?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row??);
    }
    Ok(slots)
}

fn parse_closed_slot_row(row: &rusqlite::Row) -> anyhow::Result<ClosedSlot> {
    let id: String = row.get(0)?;
    let closed_date: String = row.get(1)?;
    let closed_time: Option<String> = row.get(2)?;
    let reason: Option<String> = row.get(3)?;
    let created_at: String = row.get(4)?;

    let closed_time = match closed_time {
        Some(raw) => Some(
            NaiveTime::parse_from_str(&raw, TIME_FORMAT)
                .with_context(|| format!("malformed closed_time for {id}"))?,
        ),
        None => None,
    };

    Ok(ClosedSlot {
        closed_date: NaiveDate::parse_from_str(&closed_date, DATE_FORMAT)
            .with_context(|| format!("malformed closed_date for {id}"))?,
        closed_time,
        reason,
        created_at: NaiveDateTime::parse_from_str(&created_at, TIMESTAMP_FORMAT)
            .with_context(|| format!("malformed created_at for {id}"))?,
        id,
    })
}

// ── Verification Codes ──

pub fn delete_codes_for_phone(conn: &Connection, phone: &Phone) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM verification_codes WHERE phone = ?1",
        params![phone.as_str()],
    )?;
    Ok(count)
}

pub fn insert_code(
    conn: &Connection,
    phone: &Phone,
    code: &str,
    expires_at: &NaiveDateTime,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO verification_codes (phone, code, expires_at, verified) VALUES (?1, ?2, ?3, 0)",
        params![phone.as_str(), code, ts(expires_at)],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Marks a live, unconsumed code as verified. Lookup and mark happen in one statement,
/// so a code can be consumed at most once.
pub fn consume_code(
    conn: &Connection,
    phone: &Phone,
    code: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE verification_codes SET verified = 1
         WHERE id = (
             SELECT id FROM verification_codes
             WHERE phone = ?1 AND code = ?2 AND verified = 0 AND expires_at > ?3
             ORDER BY id DESC LIMIT 1
         )",
        params![phone.as_str(), code, ts(now)],
    )?;
    Ok(count > 0)
}

pub fn record_code_request(conn: &Connection, phone: &Phone, at: &NaiveDateTime) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO verification_requests (phone, requested_at) VALUES (?1, ?2)",
        params![phone.as_str(), ts(at)],
    )?;
    Ok(())
}

/// Number of code requests for `phone` after `since`, with the oldest of them.
pub fn code_requests_since(
    conn: &Connection,
    phone: &Phone,
    since: &NaiveDateTime,
) -> anyhow::Result<(i64, Option<NaiveDateTime>)> {
    let (count, oldest): (i64, Option<String>) = conn.query_row(
        "SELECT COUNT(*), MIN(requested_at) FROM verification_requests
         WHERE phone = ?1 AND requested_at > ?2",
        params![phone.as_str(), ts(since)],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let oldest = match oldest {
        Some(raw) => Some(
            NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
                .context("malformed requested_at in database")?,
        ),
        None => None,
    };
    Ok((count, oldest))
}

pub fn cleanup_code_requests(conn: &Connection, before: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM verification_requests WHERE requested_at <= ?1",
        params![ts(before)],
    )?;
    Ok(count)
}
