use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use rusqlite::Connection;

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::verification::is_well_formed_code;
use crate::models::Phone;
use crate::services::notifications::{self, Notice};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq)]
pub enum CodeIssued {
    Sent,
    /// Reviewer account outside production: fixed code, nothing dispatched.
    TestAccount,
}

struct IssuedCode {
    code: String,
    test_account: bool,
}

pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

fn is_test_account(config: &AppConfig, phone: &Phone) -> bool {
    !config.is_production()
        && config.test_code.is_some()
        && config
            .test_phones
            .iter()
            .filter_map(|p| Phone::parse(p).ok())
            .any(|p| &p == phone)
}

/// Rate-limit check, replacement of any earlier code, and persistence of the new one.
fn issue_code(
    conn: &Connection,
    config: &AppConfig,
    phone: &Phone,
    now: &NaiveDateTime,
) -> Result<IssuedCode, AppError> {
    let window = Duration::minutes(config.code_window_minutes);
    let window_start = *now - window;

    let (recent, oldest) = queries::code_requests_since(conn, phone, &window_start)?;
    if recent >= config.code_requests_per_window {
        let retry_after_secs = oldest
            .map(|t| (t + window - *now).num_seconds())
            .unwrap_or_else(|| window.num_seconds())
            .max(1);
        tracing::warn!(phone = %phone.masked(), recent, "verification code rate limit hit");
        return Err(AppError::RateLimited { retry_after_secs });
    }

    queries::record_code_request(conn, phone, now)?;
    queries::cleanup_code_requests(conn, &window_start)?;
    queries::delete_codes_for_phone(conn, phone)?;

    let test_account = is_test_account(config, phone);
    let (code, ttl) = match (&config.test_code, test_account) {
        (Some(fixed), true) => (fixed.clone(), Duration::days(config.test_code_ttl_days)),
        _ => (generate_code(), Duration::minutes(config.code_ttl_minutes)),
    };

    queries::insert_code(conn, phone, &code, &(*now + ttl))?;

    Ok(IssuedCode { code, test_account })
}

pub async fn request_code(
    state: &AppState,
    raw_phone: &str,
    now: NaiveDateTime,
) -> Result<CodeIssued, AppError> {
    let phone = Phone::parse(raw_phone)?;

    let issued = {
        let db = state.db()?;
        issue_code(&db, &state.config, &phone, &now)?
    };

    if issued.test_account {
        tracing::info!(phone = %phone.masked(), "test account code issued, dispatch skipped");
        return Ok(CodeIssued::TestAccount);
    }

    notifications::send(state, &phone, &Notice::VerificationCode { code: issued.code }).await?;
    Ok(CodeIssued::Sent)
}

/// Consumes a live code for `phone`. Which check failed is never reported.
pub fn verify(
    conn: &Connection,
    phone: &Phone,
    code: &str,
    now: &NaiveDateTime,
) -> Result<(), AppError> {
    if !is_well_formed_code(code) {
        return Err(AppError::BadCode);
    }
    if queries::consume_code(conn, phone, code, now)? {
        Ok(())
    } else {
        Err(AppError::BadCode)
    }
}
