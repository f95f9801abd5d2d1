pub mod availability;
pub mod booking;
pub mod closed_slot;
pub mod phone;
pub mod verification;

pub use availability::{DaySlot, SlotGrid, SlotState};
pub use booking::{Booking, BookingPatch, BookingStatus};
pub use closed_slot::ClosedSlot;
pub use phone::Phone;
