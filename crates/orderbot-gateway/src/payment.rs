//! Payment link providers

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use orderbot_core::{CustomerId, Decimal, RoundingStrategy};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::{PaymentProviderKind, PaymentSettings};
use crate::{GatewayError, Result};

/// Creates a checkout URL for a confirmed order
#[async_trait]
pub trait PaymentLinkProvider: Send + Sync {
    async fn create_link(&self, customer: &CustomerId, amount: Decimal) -> Result<String>;

    fn name(&self) -> &'static str;
}

/// Two decimal places, e.g. `5.00`
pub fn format_amount(amount: Decimal) -> String {
    let mut value = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    value.rescale(2);
    value.to_string()
}

/// Pick the provider named in `settings`, falling back to [`DisabledProvider`]
/// when its credentials are incomplete.
pub fn from_settings(settings: &PaymentSettings) -> Arc<dyn PaymentLinkProvider> {
    match settings.provider {
        PaymentProviderKind::Paypal => match PayPalProvider::from_settings(settings) {
            Some(provider) => Arc::new(provider),
            None => {
                tracing::warn!("PayPal selected but PAYPAL_CLIENT_ID / PAYPAL_SECRET are not set; payments disabled");
                Arc::new(DisabledProvider)
            }
        },
        PaymentProviderKind::StaticLink => match &settings.link_template {
            Some(template) => Arc::new(StaticLinkProvider::new(template)),
            None => {
                tracing::warn!("static_link selected without link_template; payments disabled");
                Arc::new(DisabledProvider)
            }
        },
        PaymentProviderKind::Disabled => Arc::new(DisabledProvider),
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    links: Vec<OrderLink>,
}

#[derive(Debug, Deserialize)]
struct OrderLink {
    href: String,
    rel: String,
}

/// PayPal Orders v2 checkout
pub struct PayPalProvider {
    api_url: String,
    client_id: String,
    client_secret: String,
    currency: String,
    return_url: String,
    cancel_url: String,
    token: Mutex<Option<CachedToken>>,
    http_client: reqwest::Client,
}

impl PayPalProvider {
    pub fn new(
        api_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let defaults = PaymentSettings::default();
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            currency: defaults.currency,
            return_url: defaults.return_url,
            cancel_url: defaults.cancel_url,
            token: Mutex::new(None),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn from_settings(settings: &PaymentSettings) -> Option<Self> {
        let (Some(id), Some(secret)) = (&settings.client_id, &settings.client_secret) else {
            return None;
        };
        let mut provider = Self::new(&settings.api_url, id, secret);
        provider.currency = settings.currency.clone();
        provider.return_url = settings.return_url.clone();
        provider.cancel_url = settings.cancel_url.clone();
        Some(provider)
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock();
        guard
            .as_ref()
            .filter(|t| t.expires_at > Utc::now())
            .map(|t| t.token.clone())
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let response = self
            .http_client
            .post(format!("{}/v1/oauth2/token", self.api_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Payment(format!(
                "PayPal token error ({}): {}",
                status, error_text
            )));
        }

        let token: TokenResponse = response.json().await?;
        // Refresh a minute early.
        let lifetime = token.expires_in.unwrap_or(0).saturating_sub(60);
        if lifetime > 0 {
            *self.token.lock() = Some(CachedToken {
                token: token.access_token.clone(),
                expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
            });
        }
        Ok(token.access_token)
    }

    fn order_body(&self, amount: Decimal) -> serde_json::Value {
        json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": self.currency,
                    "value": format_amount(amount),
                }
            }],
            "application_context": {
                "return_url": self.return_url,
                "cancel_url": self.cancel_url,
            }
        })
    }
}

#[async_trait]
impl PaymentLinkProvider for PayPalProvider {
    async fn create_link(&self, customer: &CustomerId, amount: Decimal) -> Result<String> {
        let token = self.access_token().await?;

        let response = self
            .http_client
            .post(format!("{}/v2/checkout/orders", self.api_url))
            .bearer_auth(token)
            .json(&self.order_body(amount))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Payment(format!(
                "PayPal order error ({}): {}",
                status, error_text
            )));
        }

        let order: OrderResponse = response.json().await?;
        let link = order
            .links
            .into_iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href)
            .ok_or_else(|| GatewayError::Payment("PayPal order has no approve link".to_string()))?;

        tracing::info!(
            customer = %customer,
            order_id = order.id.as_deref().unwrap_or("-"),
            amount = %format_amount(amount),
            "PayPal order created"
        );
        Ok(link)
    }

    fn name(&self) -> &'static str {
        "paypal"
    }
}

/// Fills a fixed URL template, for gateways that take the amount as a query
/// parameter
#[derive(Debug, Clone)]
pub struct StaticLinkProvider {
    template: String,
}

impl StaticLinkProvider {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn render(&self, amount: Decimal, order_id: &str) -> String {
        self.template
            .replace("{amount}", &format_amount(amount))
            .replace("{order_id}", order_id)
    }
}

#[async_trait]
impl PaymentLinkProvider for StaticLinkProvider {
    async fn create_link(&self, customer: &CustomerId, amount: Decimal) -> Result<String> {
        let order_id = uuid::Uuid::new_v4().simple().to_string();
        tracing::info!(customer = %customer, order_id = %order_id, "Static payment link issued");
        Ok(self.render(amount, &order_id))
    }

    fn name(&self) -> &'static str {
        "static_link"
    }
}

/// Always fails; customers get the apology reply
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledProvider;

#[async_trait]
impl PaymentLinkProvider for DisabledProvider {
    async fn create_link(&self, _customer: &CustomerId, _amount: Decimal) -> Result<String> {
        Err(GatewayError::Payment("payments are disabled".to_string()))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
