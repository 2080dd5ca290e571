//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::{GatewayError, DEFAULT_HOST, DEFAULT_PORT};

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Token Meta echoes back during webhook verification
    pub verify_token: String,

    /// WhatsApp Cloud API credentials
    pub whatsapp: WhatsAppSettings,

    /// Twilio credentials
    pub twilio: TwilioSettings,

    /// Payment link provider
    pub payment: PaymentSettings,

    /// Menu source and refresh
    pub menu: MenuSettings,

    /// Session lifecycle
    pub session: SessionSettings,

    /// Upper bound for each outbound call
    pub side_effect_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            verify_token: String::new(),
            whatsapp: WhatsAppSettings::default(),
            twilio: TwilioSettings::default(),
            payment: PaymentSettings::default(),
            menu: MenuSettings::default(),
            session: SessionSettings::default(),
            side_effect_timeout_secs: 10,
        }
    }
}

impl GatewayConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_verify_token(mut self, token: impl Into<String>) -> Self {
        self.verify_token = token.into();
        self
    }

    pub fn with_menu_path(mut self, path: impl Into<String>) -> Self {
        self.menu.path = path.into();
        self
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> crate::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("invalid listen address: {}", e)))
    }

    pub fn side_effect_timeout(&self) -> Duration {
        Duration::from_secs(self.side_effect_timeout_secs.max(1))
    }

    /// Load configuration from a file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &str) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> crate::Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    pub fn with_overrides<F>(mut self, lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| GatewayError::Config(format!("PORT is not a port number: {}", port)))?;
        }
        if let Some(v) = get("VERIFY_TOKEN") {
            self.verify_token = v;
        }
        if let Some(v) = get("ACCESS_TOKEN") {
            self.whatsapp.access_token = Some(v);
        }
        if let Some(v) = get("PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = Some(v);
        }
        if let Some(v) = get("PAYPAL_API_URL") {
            self.payment.api_url = v;
        }
        if let Some(v) = get("PAYPAL_CLIENT_ID") {
            self.payment.client_id = Some(v);
        }
        if let Some(v) = get("PAYPAL_SECRET") {
            self.payment.client_secret = Some(v);
        }
        if let Some(v) = get("TWILIO_ACCOUNT_SID") {
            self.twilio.account_sid = Some(v);
        }
        if let Some(v) = get("TWILIO_AUTH_TOKEN") {
            self.twilio.auth_token = Some(v);
        }
        if let Some(v) = get("TWILIO_WHATSAPP_NUMBER") {
            self.twilio.from_number = Some(v);
        }
        if let Some(v) = get("MENU_PATH") {
            self.menu.path = v;
        }
        if let Some(v) = get("SHEET_CSV_URL") {
            self.menu.sheet_csv_url = Some(v);
        }
        Ok(self)
    }
}

/// WhatsApp Cloud API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppSettings {
    pub api_base: String,
    pub phone_number_id: Option<String>,
    pub access_token: Option<String>,
}

impl Default for WhatsAppSettings {
    fn default() -> Self {
        Self {
            api_base: "https://graph.facebook.com/v19.0".to_string(),
            phone_number_id: None,
            access_token: None,
        }
    }
}

impl WhatsAppSettings {
    pub fn is_configured(&self) -> bool {
        self.phone_number_id.is_some() && self.access_token.is_some()
    }
}

/// Twilio WhatsApp settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioSettings {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,

    /// Sender, e.g. `whatsapp:+14155238886`
    pub from_number: Option<String>,
}

impl TwilioSettings {
    pub fn is_configured(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_number.is_some()
    }
}

/// Which payment link provider to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProviderKind {
    Paypal,
    StaticLink,
    Disabled,
}

/// Payment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    pub provider: PaymentProviderKind,
    pub api_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub currency: String,
    pub return_url: String,
    pub cancel_url: String,

    /// Template for `static_link`, with `{amount}` and `{order_id}` placeholders
    pub link_template: Option<String>,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            provider: PaymentProviderKind::Paypal,
            api_url: "https://api-m.sandbox.paypal.com".to_string(),
            client_id: None,
            client_secret: None,
            currency: "USD".to_string(),
            return_url: "https://example.com/success".to_string(),
            cancel_url: "https://example.com/cancel".to_string(),
            link_template: None,
        }
    }
}

/// Menu settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuSettings {
    /// JSON menu document
    pub path: String,

    /// Published spreadsheet CSV; takes precedence over `path` when set
    pub sheet_csv_url: Option<String>,

    /// Reload period, 0 disables refresh
    pub refresh_interval_secs: u64,
}

impl Default for MenuSettings {
    fn default() -> Self {
        Self {
            path: "menu.json".to_string(),
            sheet_csv_url: None,
            refresh_interval_secs: 0,
        }
    }
}

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Idle time after which a session is discarded
    pub idle_timeout_secs: u64,

    /// How often the idle sweeper runs
    pub sweep_interval_secs: u64,

    /// How long inbound message ids are remembered
    pub dedup_window_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800, // 30 minutes
            sweep_interval_secs: 60,
            dedup_window_secs: 600,
        }
    }
}
