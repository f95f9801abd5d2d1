use chrono::NaiveDateTime;

use crate::models::Phone;
use crate::services::ledger::{self, ReplyCancel};
use crate::services::notifications::{self, Notice};
use crate::state::AppState;

/// The only body an inbound reply may carry to cancel.
const CANCEL_COMMAND: &str = "0";

#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    Ignored,
    NoBooking,
    Refused { booking_id: String },
    Cancelled { booking_id: String, remaining: usize },
    Failed,
}

/// Handles a customer's SMS reply. Always resolves; failures become a reply to the sender.
pub async fn handle_inbound_reply(
    state: &AppState,
    from: &str,
    body: &str,
    now: NaiveDateTime,
) -> InboundOutcome {
    let phone = match Phone::parse(from) {
        Ok(p) => p,
        Err(_) => {
            tracing::warn!("inbound reply from unrecognised number, ignoring");
            return InboundOutcome::Ignored;
        }
    };

    if body.trim() != CANCEL_COMMAND {
        tracing::info!(phone = %phone.masked(), "inbound reply is not a cancel command");
        return InboundOutcome::Ignored;
    }

    let result = match state.db() {
        Ok(mut db) => ledger::cancel_nearest_for_phone(&mut db, &state.config, &phone, &now),
        Err(e) => Err(e),
    };

    match result {
        Ok(ReplyCancel::NoBooking) => {
            let _ = notifications::send(state, &phone, &Notice::NoBookingFound).await;
            InboundOutcome::NoBooking
        }
        Ok(ReplyCancel::TooLate(booking)) => {
            tracing::info!(booking_id = %booking.id, "cancel by reply refused, too close to start");
            let notice = Notice::CancellationRefused {
                date: booking.booking_date,
                time: booking.booking_time,
            };
            let _ = notifications::send(state, &phone, &notice).await;
            InboundOutcome::Refused { booking_id: booking.id }
        }
        Ok(ReplyCancel::Cancelled { booking, remaining }) => {
            tracing::info!(booking_id = %booking.id, remaining, "booking cancelled by reply");
            let notice = Notice::CancelledByReply {
                date: booking.booking_date,
                time: booking.booking_time,
                remaining,
            };
            let _ = notifications::send(state, &phone, &notice).await;
            InboundOutcome::Cancelled {
                booking_id: booking.id,
                remaining,
            }
        }
        Err(e) => {
            tracing::error!(error = %e, phone = %phone.masked(), "cancel by reply failed");
            let _ = notifications::send(state, &phone, &Notice::CancellationFailed).await;
            InboundOutcome::Failed
        }
    }
}
