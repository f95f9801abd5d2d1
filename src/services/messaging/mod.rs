pub mod smsgate;
pub mod twilio;

use async_trait::async_trait;

use crate::models::Phone;

/// Outbound SMS transport.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(&self, to: &Phone, body: &str) -> anyhow::Result<()>;
}
