use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};

use crate::models::availability::format_time;

/// An admin block on one slot, or on the whole day when `closed_time` is `None`.
#[derive(Debug, Clone, Serialize)]
pub struct ClosedSlot {
    pub id: String,
    pub closed_date: NaiveDate,
    #[serde(serialize_with = "serialize_optional_time")]
    pub closed_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub created_at: NaiveDateTime,
}

impl ClosedSlot {
    pub fn is_whole_day(&self) -> bool {
        self.closed_time.is_none()
    }
}

fn serialize_optional_time<S: Serializer>(t: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
    match t {
        Some(t) => s.serialize_str(&format_time(t)),
        None => s.serialize_none(),
    }
}
