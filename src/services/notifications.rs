use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::availability::format_time;
use crate::models::{Booking, Phone};
use crate::state::AppState;

/// A message the business sends to a customer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    VerificationCode { code: String },
    BookingConfirmation { date: NaiveDate, time: NaiveTime },
    BookingUpdated { date: NaiveDate, time: NaiveTime },
    BookingCancelled { date: NaiveDate, time: NaiveTime },
    BookingReminder { name: String, date: NaiveDate, time: NaiveTime },
    CancellationRefused { date: NaiveDate, time: NaiveTime },
    CancelledByReply { date: NaiveDate, time: NaiveTime, remaining: usize },
    NoBookingFound,
    CancellationFailed,
}

impl Notice {
    pub fn confirmation(booking: &Booking) -> Self {
        Notice::BookingConfirmation {
            date: booking.booking_date,
            time: booking.booking_time,
        }
    }

    pub fn updated(booking: &Booking) -> Self {
        Notice::BookingUpdated {
            date: booking.booking_date,
            time: booking.booking_time,
        }
    }

    pub fn cancelled(booking: &Booking) -> Self {
        Notice::BookingCancelled {
            date: booking.booking_date,
            time: booking.booking_time,
        }
    }

    pub fn reminder(booking: &Booking) -> Self {
        Notice::BookingReminder {
            name: booking.customer_name.clone(),
            date: booking.booking_date,
            time: booking.booking_time,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notice::VerificationCode { .. } => "verification_code",
            Notice::BookingConfirmation { .. } => "booking_confirmation",
            Notice::BookingUpdated { .. } => "booking_updated",
            Notice::BookingCancelled { .. } | Notice::CancelledByReply { .. } => "booking_cancelled",
            Notice::BookingReminder { .. } => "booking_reminder",
            Notice::CancellationRefused { .. } => "cancellation_refused",
            Notice::NoBookingFound => "no_booking_found",
            Notice::CancellationFailed => "cancellation_failed",
        }
    }
}

/// `Monday 10/3`
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%A %-d/%-m").to_string()
}

pub fn render(notice: &Notice, config: &AppConfig) -> String {
    let signature = &config.business_name;
    let hours = config.min_cancel_hours;

    let text = match notice {
        Notice::VerificationCode { code } => format!("Your verification code is: {code}"),
        Notice::BookingConfirmation { date, time } => format!(
            "Your appointment is confirmed!\nDate: {}\nTime: {}\n\nTo cancel, reply 0 (at least {hours} hours before the appointment)",
            format_date(date),
            format_time(time)
        ),
        Notice::BookingUpdated { date, time } => format!(
            "Your appointment was updated!\nDate: {}\nTime: {}",
            format_date(date),
            format_time(time)
        ),
        Notice::BookingCancelled { date, time } => format!(
            "Your appointment on {} at {} was cancelled.",
            format_date(date),
            format_time(time)
        ),
        Notice::BookingReminder { name, date, time } => format!(
            "Reminder! You have an appointment tomorrow\nName: {name}\nDate: {}\nTime: {}\n\nSee you!",
            format_date(date),
            format_time(time)
        ),
        Notice::CancellationRefused { date, time } => format!(
            "Appointments cannot be cancelled less than {hours} hours in advance.\nYour appointment on {} at {} is still on.",
            format_date(date),
            format_time(time)
        ),
        Notice::CancelledByReply {
            date,
            time,
            remaining,
        } => {
            let mut text = format!(
                "Your appointment on {} at {} was cancelled successfully.",
                format_date(date),
                format_time(time)
            );
            if *remaining > 0 {
                text.push_str(&format!(
                    "\nYou still have {remaining} upcoming appointment(s). Reply 0 again to cancel the next one."
                ));
            }
            text
        }
        Notice::NoBookingFound => "No active appointment was found to cancel.".to_string(),
        Notice::CancellationFailed => {
            "Something went wrong cancelling your appointment. Please try again later.".to_string()
        }
    };

    format!("{text}\n{signature}")
}

pub async fn send(state: &AppState, to: &Phone, notice: &Notice) -> Result<(), AppError> {
    let body = render(notice, &state.config);

    match state.messaging.send_message(to, &body).await {
        Ok(()) => {
            tracing::info!(kind = notice.kind(), phone = %to.masked(), "notification sent");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, kind = notice.kind(), phone = %to.masked(), "notification failed");
            Err(AppError::DispatchFailed(e.to_string()))
        }
    }
}

/// Sends after the caller's write has committed. Failures are logged by [`send`] and dropped.
pub fn dispatch_in_background(state: &Arc<AppState>, to: Phone, notice: Notice) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let _ = send(&state, &to, &notice).await;
    });
}
