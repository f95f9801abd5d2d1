use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;

use super::MessagingProvider;
use crate::models::Phone;

/// Android SMS gateway (sms-gate.app) reached through its third-party HTTP API.
pub struct SmsGateProvider {
    url: String,
    login: String,
    password: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewayMessage<'a> {
    text_message: TextMessage<'a>,
    phone_numbers: [&'a str; 1],
}

#[derive(Serialize)]
struct TextMessage<'a> {
    text: &'a str,
}

impl SmsGateProvider {
    pub fn new(url: String, login: String, password: String) -> Self {
        Self {
            url,
            login,
            password,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MessagingProvider for SmsGateProvider {
    async fn send_message(&self, to: &Phone, body: &str) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.login.is_empty() && !self.password.is_empty(),
            "SMS gateway credentials are not configured"
        );

        let message = GatewayMessage {
            text_message: TextMessage { text: body },
            phone_numbers: [to.as_str()],
        };

        let res = self
            .client
            .post(&self.url)
            .basic_auth(&self.login, Some(&self.password))
            .json(&message)
            .send()
            .await
            .context("failed to reach SMS gateway")?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            anyhow::bail!("SMS gateway returned {status}: {detail}");
        }

        Ok(())
    }
}
