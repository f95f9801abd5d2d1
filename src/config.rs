use std::env;

use chrono::{DateTime, NaiveDateTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::models::SlotGrid;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub app_env: String,
    pub cors_origin: Option<String>,
    pub sms_provider: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    pub smsgate_url: String,
    pub smsgate_login: String,
    pub smsgate_password: String,
    pub business_name: String,
    pub timezone: Tz,
    pub opening_hour: u32,
    pub closing_hour: u32,
    pub slot_minutes: u32,
    pub closed_weekdays: Vec<Weekday>,
    pub min_cancel_hours: i64,
    pub code_ttl_minutes: i64,
    pub code_requests_per_window: i64,
    pub code_window_minutes: i64,
    pub test_phones: Vec<String>,
    pub test_code: Option<String>,
    pub test_code_ttl_days: i64,
    pub reminder_interval_minutes: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "slotbook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "production".to_string()),
            cors_origin: env::var("CORS_ORIGIN").ok().filter(|v| !v.is_empty()),
            sms_provider: env::var("SMS_PROVIDER").unwrap_or_else(|_| "twilio".to_string()),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
            smsgate_url: env::var("SMSGATE_URL")
                .unwrap_or_else(|_| "https://api.sms-gate.app/3rdparty/v1/message".to_string()),
            smsgate_login: env::var("SMSGATE_LOGIN").unwrap_or_default(),
            smsgate_password: env::var("SMSGATE_PASSWORD").unwrap_or_default(),
            business_name: env::var("BUSINESS_NAME").unwrap_or_else(|_| "BARBERSHOP".to_string()),
            timezone: business_timezone(),
            opening_hour: parsed("OPENING_HOUR", 10),
            closing_hour: parsed("CLOSING_HOUR", 17),
            slot_minutes: parsed("SLOT_MINUTES", 40),
            closed_weekdays: env::var("CLOSED_WEEKDAYS")
                .map(|v| parse_weekdays(&v))
                .unwrap_or_default(),
            min_cancel_hours: parsed("MIN_CANCEL_HOURS", 3),
            code_ttl_minutes: parsed("CODE_TTL_MINUTES", 5),
            code_requests_per_window: parsed("CODE_REQUESTS_PER_WINDOW", 3),
            code_window_minutes: parsed("CODE_WINDOW_MINUTES", 60),
            test_phones: env::var("TEST_PHONES")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            test_code: env::var("TEST_CODE").ok().filter(|v| !v.is_empty()),
            test_code_ttl_days: parsed("TEST_CODE_TTL_DAYS", 30),
            reminder_interval_minutes: parsed("REMINDER_INTERVAL_MINUTES", 0),
        }
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn slot_grid(&self) -> SlotGrid {
        SlotGrid::new(self.opening_hour, self.closing_hour, self.slot_minutes)
    }

    /// Wall-clock time at the business, daylight saving included.
    pub fn local_now(&self) -> NaiveDateTime {
        self.local_at(Utc::now())
    }

    pub fn local_at(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.timezone).naive_local()
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn business_timezone() -> Tz {
    match env::var("BUSINESS_TIMEZONE") {
        Ok(name) => name.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(zone = %name, "unknown BUSINESS_TIMEZONE, using Asia/Jerusalem");
            chrono_tz::Asia::Jerusalem
        }),
        Err(_) => chrono_tz::Asia::Jerusalem,
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

pub fn parse_weekdays(s: &str) -> Vec<Weekday> {
    split_list(s)
        .iter()
        .filter_map(|day| match day.to_lowercase().as_str() {
            "mon" => Some(Weekday::Mon),
            "tue" => Some(Weekday::Tue),
            "wed" => Some(Weekday::Wed),
            "thu" => Some(Weekday::Thu),
            "fri" => Some(Weekday::Fri),
            "sat" => Some(Weekday::Sat),
            "sun" => Some(Weekday::Sun),
            other => {
                tracing::warn!(day = other, "ignoring unknown weekday in CLOSED_WEEKDAYS");
                None
            }
        })
        .collect()
}
