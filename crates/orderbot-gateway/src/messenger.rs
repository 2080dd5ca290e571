//! Outbound message senders

use async_trait::async_trait;
use orderbot_core::CustomerId;
use serde_json::json;

use crate::config::{TwilioSettings, WhatsAppSettings};
use crate::{GatewayError, Result};

/// Delivers one text message to a customer
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, to: &CustomerId, body: &str) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// WhatsApp Cloud API sender
#[derive(Debug, Clone)]
pub struct WhatsAppCloudSender {
    api_base: String,
    phone_number_id: String,
    access_token: String,
    http_client: reqwest::Client,
}

impl WhatsAppCloudSender {
    pub fn new(
        api_base: impl Into<String>,
        phone_number_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            phone_number_id: phone_number_id.into(),
            access_token: access_token.into(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn from_settings(settings: &WhatsAppSettings) -> Option<Self> {
        match (&settings.phone_number_id, &settings.access_token) {
            (Some(id), Some(token)) => Some(Self::new(&settings.api_base, id, token)),
            _ => None,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_number_id)
    }
}

#[async_trait]
impl MessageSender for WhatsAppCloudSender {
    async fn send(&self, to: &CustomerId, body: &str) -> Result<()> {
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to.as_str(),
            "type": "text",
            "text": { "body": body },
        });

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Messaging(format!(
                "WhatsApp API error ({}): {}",
                status, error_text
            )));
        }

        tracing::debug!(customer = %to, "Message sent via WhatsApp Cloud API");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "whatsapp_cloud"
    }
}

/// Twilio Programmable Messaging sender
#[derive(Debug, Clone)]
pub struct TwilioSender {
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    http_client: reqwest::Client,
}

impl TwilioSender {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Self {
        Self {
            api_base: "https://api.twilio.com".to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn from_settings(settings: &TwilioSettings) -> Option<Self> {
        match (&settings.account_sid, &settings.auth_token, &settings.from_number) {
            (Some(sid), Some(token), Some(from)) => Some(Self::new(sid, token, from)),
            _ => None,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

#[async_trait]
impl MessageSender for TwilioSender {
    async fn send(&self, to: &CustomerId, body: &str) -> Result<()> {
        let params = [
            ("From", self.from_number.as_str()),
            ("To", to.as_str()),
            ("Body", body),
        ];

        let response = self
            .http_client
            .post(self.endpoint())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Messaging(format!(
                "Twilio API error ({}): {}",
                status, error_text
            )));
        }

        tracing::debug!(customer = %to, "Message sent via Twilio");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "twilio"
    }
}

/// Writes replies to the log; used when no provider is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send(&self, to: &CustomerId, body: &str) -> Result<()> {
        tracing::info!(customer = %to, body, "Outbound message (no provider configured)");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        let sender = WhatsAppCloudSender::new("https://graph.facebook.com/v19.0/", "123", "tok");
        assert_eq!(sender.endpoint(), "https://graph.facebook.com/v19.0/123/messages");

        let sender = TwilioSender::new("AC1", "secret", "whatsapp:+14155238886");
        assert_eq!(
            sender.endpoint(),
            "https://api.twilio.com/2010-04-01/Accounts/AC1/Messages.json"
        );
    }

    #[test]
    fn test_from_settings_requires_credentials() {
        assert!(WhatsAppCloudSender::from_settings(&WhatsAppSettings::default()).is_none());
        assert!(TwilioSender::from_settings(&TwilioSettings::default()).is_none());

        let settings = TwilioSettings {
            account_sid: Some("AC1".to_string()),
            auth_token: Some("secret".to_string()),
            from_number: Some("whatsapp:+14155238886".to_string()),
        };
        assert_eq!(TwilioSender::from_settings(&settings).unwrap().name(), "twilio");
    }

    #[tokio::test]
    async fn test_log_sender_always_succeeds() {
        LogSender
            .send(&CustomerId::new("+15550001"), "hello")
            .await
            .unwrap();
    }
}
