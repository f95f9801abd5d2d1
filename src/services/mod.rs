pub mod availability;
pub mod inbound;
pub mod ledger;
pub mod messaging;
pub mod notifications;
pub mod reminders;
pub mod slot_control;
pub mod verification;
