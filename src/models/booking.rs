use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::availability::serialize_time;
use crate::models::Phone;

#[derive(Debug, Clone, Serialize)]
pub struct Booking {
    pub id: String,
    pub customer_name: String,
    pub customer_phone: Phone,
    pub booking_date: NaiveDate,
    #[serde(serialize_with = "serialize_time")]
    pub booking_time: NaiveTime,
    pub status: BookingStatus,
    pub reminder_sent: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.booking_date.and_time(self.booking_time)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => BookingStatus::Confirmed,
            _ => BookingStatus::Cancelled,
        }
    }
}

/// Fields an admin may change on an existing booking.
#[derive(Debug, Clone, Default)]
pub struct BookingPatch {
    pub customer_name: Option<String>,
    pub customer_phone: Option<Phone>,
    pub booking_time: Option<NaiveTime>,
}

impl BookingPatch {
    pub fn is_empty(&self) -> bool {
        self.customer_name.is_none() && self.customer_phone.is_none() && self.booking_time.is_none()
    }
}

/// Trims and checks a customer name: 1-100 characters of letters, spaces, hyphens or apostrophes.
pub fn validate_customer_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::validation("customer_name", "name is required"));
    }
    if name.chars().count() > 100 {
        return Err(AppError::validation(
            "customer_name",
            "name is too long (maximum 100 characters)",
        ));
    }
    let allowed = name
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '-' || c == '\'');
    if !allowed {
        return Err(AppError::validation(
            "customer_name",
            "name may only contain letters, spaces, hyphens and apostrophes",
        ));
    }
    Ok(name.to_string())
}
