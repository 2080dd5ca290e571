//! Inbound webhook payloads and their normalization

use orderbot_core::{CustomerId, InboundEvent};
use serde::{Deserialize, Serialize};

/// Which provider delivered a message; replies go back the same way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    WhatsAppCloud,
    Twilio,
}

/// Query string of Meta's subscription handshake
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,

    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,

    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

impl VerifyQuery {
    /// The challenge to echo, if mode and token check out
    pub fn challenge_for(&self, expected_token: &str) -> Option<&str> {
        if expected_token.is_empty() {
            return None;
        }
        match (self.mode.as_deref(), self.verify_token.as_deref()) {
            (Some("subscribe"), Some(token)) if token == expected_token => {
                Some(self.challenge.as_deref().unwrap_or_default())
            }
            _ => None,
        }
    }
}

/// WhatsApp Cloud API notification
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetaPayload {
    #[serde(default)]
    pub entry: Vec<MetaEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetaEntry {
    #[serde(default)]
    pub changes: Vec<MetaChange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetaChange {
    #[serde(default)]
    pub value: MetaValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetaValue {
    #[serde(default)]
    pub messages: Vec<MetaMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaMessage {
    pub from: String,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub text: Option<MetaText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaText {
    pub body: String,
}

impl MetaPayload {
    /// First message of the first change; `None` for status callbacks.
    pub fn into_event(self) -> Option<InboundEvent> {
        let message = self
            .entry
            .into_iter()
            .next()?
            .changes
            .into_iter()
            .next()?
            .value
            .messages
            .into_iter()
            .next()?;

        let text = match message.kind.as_deref() {
            Some("text") | None => message.text.map(|t| t.body),
            Some(other) => {
                tracing::debug!(kind = other, "Non-text WhatsApp message");
                None
            }
        };

        Some(InboundEvent {
            customer: CustomerId::new(message.from),
            text,
            message_id: message.id,
        })
    }
}

/// Twilio WhatsApp form post
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwilioForm {
    #[serde(rename = "From", default)]
    pub from: String,

    #[serde(rename = "Body", default)]
    pub body: String,

    #[serde(rename = "MessageSid", default)]
    pub message_sid: Option<String>,

    #[serde(rename = "NumMedia", default)]
    pub num_media: Option<String>,
}

impl TwilioForm {
    /// `None` when the sender is missing.
    pub fn into_event(self) -> Option<InboundEvent> {
        if self.from.trim().is_empty() {
            return None;
        }
        let has_media = self
            .num_media
            .as_deref()
            .and_then(|n| n.trim().parse::<u32>().ok())
            .is_some_and(|n| n > 0);

        let text = if self.body.trim().is_empty() && has_media {
            None
        } else {
            Some(self.body)
        };

        Some(InboundEvent {
            customer: CustomerId::new(self.from),
            text,
            message_id: self.message_sid.filter(|s| !s.is_empty()),
        })
    }
}
