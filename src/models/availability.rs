use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::errors::AppError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// The fixed daily grid of bookable slot starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotGrid {
    pub opening_hour: u32,
    pub closing_hour: u32,
    pub slot_minutes: u32,
}

impl SlotGrid {
    pub fn new(opening_hour: u32, closing_hour: u32, slot_minutes: u32) -> Self {
        Self {
            opening_hour,
            closing_hour,
            slot_minutes,
        }
    }

    /// Every slot start from opening time, stepping by the slot length, strictly before closing.
    pub fn times(&self) -> Vec<NaiveTime> {
        let mut slots = vec![];
        if self.slot_minutes == 0 {
            return slots;
        }
        let mut minutes = self.opening_hour * 60;
        let end = self.closing_hour.min(24) * 60;
        while minutes < end {
            if let Some(t) = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0) {
                slots.push(t);
            }
            minutes += self.slot_minutes;
        }
        slots
    }

    pub fn contains(&self, time: &NaiveTime) -> bool {
        self.times().contains(time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Open,
    Booked,
    Closed,
    Past,
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySlot {
    #[serde(serialize_with = "serialize_time")]
    pub time: NaiveTime,
    pub state: SlotState,
}

pub fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    let trimmed = s.trim();
    if trimmed.len() != 10 {
        return Err(AppError::validation("booking_date", "invalid date (format: YYYY-MM-DD)"));
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|_| AppError::validation("booking_date", "invalid date (format: YYYY-MM-DD)"))
}

pub fn parse_time(s: &str) -> Result<NaiveTime, AppError> {
    let trimmed = s.trim();
    let parts: Vec<&str> = trimmed.split(':').collect();
    let well_formed = parts.len() == 2
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_digit()));
    if !well_formed {
        return Err(AppError::validation("booking_time", "invalid time (format: HH:MM)"));
    }
    NaiveTime::parse_from_str(trimmed, TIME_FORMAT)
        .map_err(|_| AppError::validation("booking_time", "invalid time (format: HH:MM)"))
}

pub fn format_time(t: &NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

pub fn serialize_time<S: serde::Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_time(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, TIME_FORMAT).unwrap()
    }

    #[test]
    fn test_default_grid_shape() {
        let grid = SlotGrid::new(10, 17, 40);
        let times: Vec<String> = grid.times().iter().map(format_time).collect();
        assert_eq!(
            times,
            vec![
                "10:00", "10:40", "11:20", "12:00", "12:40", "13:20", "14:00", "14:40", "15:20",
                "16:00", "16:40"
            ]
        );
    }

    #[test]
    fn test_grid_membership() {
        let grid = SlotGrid::new(10, 17, 40);
        assert!(grid.contains(&t("10:00")));
        assert!(grid.contains(&t("11:20")));
        assert!(!grid.contains(&t("09:40")));
        assert!(!grid.contains(&t("10:30")));
        assert!(!grid.contains(&t("17:00")));
    }

    #[test]
    fn test_parse_time_rejects_loose_formats() {
        for bad in ["9:00", "10:0", "25:00", "10:00:00", "ab:cd", ""] {
            assert!(parse_time(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2025-03-10").unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
        );
        assert!(parse_date("2025-3-10").is_err());
        assert!(parse_date("2025-02-30").is_err());
        assert!(parse_date("10/03/2025").is_err());
    }

    #[test]
    fn test_zero_length_slots_yield_empty_grid() {
        assert!(SlotGrid::new(10, 17, 0).times().is_empty());
    }
}
