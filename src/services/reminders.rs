use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus};
use crate::services::notifications::{self, Notice};
use crate::state::AppState;

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct ReminderReport {
    pub sent: usize,
    pub failed: usize,
    /// Cancelled, moved or already reminded between the sweep's read and its send.
    pub skipped: usize,
    pub total: usize,
}

/// The row as it stands now, if it still wants a reminder for `date`.
fn still_due(state: &AppState, id: &str, date: &NaiveDate) -> Result<Option<Booking>, AppError> {
    let db = state.db()?;
    let current = queries::get_booking_by_id(&db, id)?;
    Ok(current.filter(|b| {
        b.status == BookingStatus::Confirmed && !b.reminder_sent && b.booking_date == *date
    }))
}

/// Reminds every confirmed booking dated tomorrow that has not been reminded yet.
/// The flag is only set after a successful send, so failed sends are retried on the next run.
pub async fn send_reminders(state: &AppState, now: NaiveDateTime) -> Result<ReminderReport, AppError> {
    let tomorrow = now.date() + Duration::days(1);

    let due = {
        let db = state.db()?;
        queries::bookings_due_reminder(&db, &tomorrow)?
    };

    let mut report = ReminderReport {
        total: due.len(),
        ..Default::default()
    };

    for candidate in &due {
        let Some(booking) = still_due(state, &candidate.id, &tomorrow)? else {
            tracing::info!(booking_id = %candidate.id, "booking changed during sweep, reminder skipped");
            report.skipped += 1;
            continue;
        };

        if notifications::send(state, &booking.customer_phone, &Notice::reminder(&booking))
            .await
            .is_err()
        {
            report.failed += 1;
            continue;
        }

        let marked = {
            let db = state.db()?;
            queries::mark_reminder_sent(&db, &booking.id)?
        };
        if !marked {
            tracing::warn!(booking_id = %booking.id, "booking removed while its reminder was in flight");
        }
        report.sent += 1;
    }

    tracing::info!(
        date = %tomorrow,
        sent = report.sent,
        failed = report.failed,
        skipped = report.skipped,
        total = report.total,
        "reminder sweep finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};

    use rusqlite::Connection;

    use super::*;
    use crate::config::AppConfig;
    use crate::db;
    use crate::models::Phone;
    use crate::services::messaging::MessagingProvider;

    struct FlakyMessaging {
        down: Arc<AtomicBool>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl MessagingProvider for FlakyMessaging {
        async fn send_message(&self, to: &Phone, _body: &str) -> anyhow::Result<()> {
            if self.down.load(Ordering::SeqCst) {
                anyhow::bail!("gateway unavailable");
            }
            self.sent.lock().unwrap().push(to.as_str().to_string());
            Ok(())
        }
    }

    fn setup() -> (AppState, Arc<AtomicBool>, Arc<Mutex<Vec<String>>>) {
        let down = Arc::new(AtomicBool::new(false));
        let sent = Arc::new(Mutex::new(vec![]));
        let messaging = FlakyMessaging {
            down: Arc::clone(&down),
            sent: Arc::clone(&sent),
        };
        let state = AppState::new(
            db::init_db(":memory:").unwrap(),
            AppConfig::from_env(),
            Box::new(messaging),
        );
        (state, down, sent)
    }

    fn book(state: &AppState, id: &str, date: &str, time: &str) {
        let created = NaiveDateTime::parse_from_str("2025-03-01 09:00", "%Y-%m-%d %H:%M").unwrap();
        let db = state.db().unwrap();
        queries::insert_booking(
            &db,
            &Booking {
                id: id.to_string(),
                customer_name: "Dana".to_string(),
                customer_phone: Phone::parse("0501234567").unwrap(),
                booking_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                booking_time: NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
                status: BookingStatus::Confirmed,
                reminder_sent: false,
                created_at: created,
                updated_at: created,
            },
        )
        .unwrap();
    }

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-03-09 18:00", "%Y-%m-%d %H:%M").unwrap()
    }

    #[tokio::test]
    async fn test_only_tomorrow_is_reminded_once() {
        let (state, _down, sent) = setup();
        book(&state, "tomorrow-a", "2025-03-10", "10:00");
        book(&state, "tomorrow-b", "2025-03-10", "12:00");
        book(&state, "later", "2025-03-11", "10:00");

        let first = send_reminders(&state, now()).await.unwrap();
        assert_eq!(first, ReminderReport { sent: 2, failed: 0, skipped: 0, total: 2 });

        let second = send_reminders(&state, now()).await.unwrap();
        assert_eq!(second, ReminderReport { sent: 0, failed: 0, skipped: 0, total: 0 });
        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_retried_next_run() {
        let (state, down, sent) = setup();
        book(&state, "b1", "2025-03-10", "10:00");

        down.store(true, Ordering::SeqCst);
        let failed = send_reminders(&state, now()).await.unwrap();
        assert_eq!(failed, ReminderReport { sent: 0, failed: 1, skipped: 0, total: 1 });
        {
            let db = state.db().unwrap();
            assert!(!queries::get_booking_by_id(&db, "b1").unwrap().unwrap().reminder_sent);
        }

        down.store(false, Ordering::SeqCst);
        let retried = send_reminders(&state, now()).await.unwrap();
        assert_eq!(retried, ReminderReport { sent: 1, failed: 0, skipped: 0, total: 1 });
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    /// Deletes `victim` from the database during the first send, like an admin cancelling mid-sweep.
    struct CancellingMessaging {
        db: Arc<Mutex<Connection>>,
        victim: &'static str,
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl MessagingProvider for CancellingMessaging {
        async fn send_message(&self, to: &Phone, _body: &str) -> anyhow::Result<()> {
            queries::delete_booking(&self.db.lock().unwrap(), self.victim)?;
            self.sent.lock().unwrap().push(to.as_str().to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_booking_cancelled_mid_sweep_is_not_reminded() {
        let db = Arc::new(Mutex::new(db::init_db(":memory:").unwrap()));
        let sent = Arc::new(Mutex::new(vec![]));
        let state = AppState {
            db: Arc::clone(&db),
            config: AppConfig::from_env(),
            messaging: Box::new(CancellingMessaging {
                db: Arc::clone(&db),
                victim: "b2",
                sent: Arc::clone(&sent),
            }),
        };
        book(&state, "b1", "2025-03-10", "10:00");
        book(&state, "b2", "2025-03-10", "12:00");

        let report = send_reminders(&state, now()).await.unwrap();

        assert_eq!(report, ReminderReport { sent: 1, failed: 0, skipped: 1, total: 2 });
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_already_reminded_booking_is_not_a_candidate() {
        let (state, _down, sent) = setup();
        book(&state, "b1", "2025-03-10", "10:00");
        {
            let db = state.db().unwrap();
            queries::mark_reminder_sent(&db, "b1").unwrap();
        }

        let report = send_reminders(&state, now()).await.unwrap();
        assert_eq!(report.total, 0);
        assert!(sent.lock().unwrap().is_empty());
    }
}
