//! Orderbot Gateway - WhatsApp webhook transport
//!
//! Receives chat messages from the WhatsApp Cloud API or Twilio, feeds them
//! through the order engine and carries out what the engine asks for.
//!
//! # Architecture
//!
//! ```text
//!  Meta webhook ─┐                          ┌─▶ WhatsAppCloudSender
//!                ├─▶ webhook ─▶ OrderEngine ─▶ Dispatcher ─┤
//!  Twilio form  ─┘   (normalize)  (core)      │            └─▶ TwilioSender
//!                                             └─▶ PaymentLinkProvider
//!                                                 (PayPal / static link)
//!
//!  MenuSource (menu.json or sheet CSV) ──refresh──▶ MenuHandle
//!  session sweeper ──────────────────────────────▶ SessionStore
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod menu_source;
pub mod messenger;
pub mod payment;
pub mod webhook;

pub use config::{GatewayConfig, PaymentProviderKind};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayState, Senders};
pub use menu_source::MenuSource;
pub use messenger::{LogSender, MessageSender, TwilioSender, WhatsAppCloudSender};
pub use payment::{DisabledProvider, PayPalProvider, PaymentLinkProvider, StaticLinkProvider};
pub use webhook::{Channel, MetaPayload, TwilioForm, VerifyQuery};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Default host
pub const DEFAULT_HOST: &str = "127.0.0.1";
