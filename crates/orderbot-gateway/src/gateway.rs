//! Main Gateway implementation
//!
//! HTTP webhook server feeding inbound chat messages into the order engine
//! and dispatching the resulting replies and payment links.

use axum::{
    body::Bytes,
    extract::{rejection::FormRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Form, Router,
};
use chrono::{DateTime, Utc};
use orderbot_core::{
    replies, ChainedParser, InMemorySessionStore, InboundEvent, MenuHandle, OrderEngine,
    SessionStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::dispatcher::Dispatcher;
use crate::menu_source::{self, MenuSource};
use crate::messenger::{LogSender, MessageSender, TwilioSender, WhatsAppCloudSender};
use crate::payment;
use crate::webhook::{Channel, MetaPayload, TwilioForm, VerifyQuery};
use crate::{GatewayError, Result};

/// Outbound sender per inbound channel
#[derive(Clone)]
pub struct Senders {
    pub whatsapp: Arc<dyn MessageSender>,
    pub twilio: Arc<dyn MessageSender>,
}

impl Senders {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let whatsapp: Arc<dyn MessageSender> =
            match WhatsAppCloudSender::from_settings(&config.whatsapp) {
                Some(sender) => Arc::new(sender),
                None => {
                    tracing::warn!("ACCESS_TOKEN / PHONE_NUMBER_ID not set; WhatsApp replies are only logged");
                    Arc::new(LogSender)
                }
            };
        let twilio: Arc<dyn MessageSender> = match TwilioSender::from_settings(&config.twilio) {
            Some(sender) => Arc::new(sender),
            None => Arc::new(LogSender),
        };
        Self { whatsapp, twilio }
    }

    /// The same sender for both channels
    pub fn single(sender: Arc<dyn MessageSender>) -> Self {
        Self {
            whatsapp: sender.clone(),
            twilio: sender,
        }
    }

    pub fn for_channel(&self, channel: Channel) -> Arc<dyn MessageSender> {
        match channel {
            Channel::WhatsAppCloud => self.whatsapp.clone(),
            Channel::Twilio => self.twilio.clone(),
        }
    }
}

/// Gateway state shared across handlers
#[derive(Clone)]
pub struct GatewayState {
    pub config: GatewayConfig,
    pub engine: Arc<OrderEngine>,
    pub senders: Senders,
    pub dispatcher: Dispatcher,
    pub started_at: DateTime<Utc>,
}

impl GatewayState {
    /// Wire the engine and collaborators described by `config` around `menu`
    pub fn new(config: GatewayConfig, menu: MenuHandle) -> Self {
        let store = InMemorySessionStore::new()
            .with_idle_timeout(Duration::from_secs(config.session.idle_timeout_secs));
        let engine = OrderEngine::new(Arc::new(store), menu)
            .with_parser(Arc::new(ChainedParser::new()))
            .with_dedup_window(Duration::from_secs(config.session.dedup_window_secs));

        let dispatcher = Dispatcher::new(
            payment::from_settings(&config.payment),
            config.side_effect_timeout(),
        );

        Self {
            senders: Senders::from_config(&config),
            engine: Arc::new(engine),
            dispatcher,
            config,
            started_at: Utc::now(),
        }
    }

    pub fn with_senders(mut self, senders: Senders) -> Self {
        self.senders = senders;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Run the engine for one inbound event and dispatch the outcome in
    /// the background. Session changes are committed before this returns.
    pub async fn handle_inbound(&self, channel: Channel, event: InboundEvent) -> JoinHandle<()> {
        let sender = self.senders.for_channel(channel);
        let dispatcher = self.dispatcher.clone();

        if event.text.is_none() {
            let customer = event.customer;
            tracing::debug!(customer = %customer, "Non-text message, sending notice");
            return tokio::spawn(async move {
                dispatcher
                    .notify(sender.as_ref(), &customer, replies::TEXT_ONLY)
                    .await;
            });
        }

        let outcome = self.engine.handle_event(event).await;
        tokio::spawn(async move {
            if outcome.is_empty() {
                return;
            }
            let report = dispatcher.dispatch(sender.as_ref(), outcome).await;
            tracing::debug!(?report, "Outcome dispatched");
        })
    }
}

/// Main Gateway
pub struct Gateway {
    state: Arc<GatewayState>,
    menu_source: Option<MenuSource>,
}

impl Gateway {
    /// Create a gateway around an already loaded menu
    pub fn new(config: GatewayConfig, menu: MenuHandle) -> Self {
        Self {
            state: Arc::new(GatewayState::new(config, menu)),
            menu_source: None,
        }
    }

    /// Load the configured menu source, then build the gateway
    pub async fn bootstrap(config: GatewayConfig) -> Self {
        let source = MenuSource::from_settings(&config.menu);
        let menu = source.load_or_empty().await;
        if menu.is_empty() {
            tracing::warn!("Menu is empty; customers will be told it is unavailable");
        }

        let mut gateway = Self::new(config, MenuHandle::new(menu));
        gateway.menu_source = Some(source);
        gateway
    }

    pub fn from_state(state: GatewayState) -> Self {
        Self {
            state: Arc::new(state),
            menu_source: None,
        }
    }

    /// Get gateway state
    pub fn state(&self) -> Arc<GatewayState> {
        self.state.clone()
    }

    /// Build the Axum router
    pub fn build_router(&self) -> Router {
        Router::new()
            .route(
                "/webhook",
                get(Self::handle_verify).post(Self::handle_meta_webhook),
            )
            .route("/webhook/twilio", post(Self::handle_twilio_webhook))
            .route("/health", get(Self::handle_health))
            .route("/status", get(Self::handle_status))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start background jobs and serve until Ctrl+C
    pub async fn start(&self) -> Result<()> {
        let addr = self.state.config.socket_addr()?;
        let router = self.build_router();

        let session = &self.state.config.session;
        let mut jobs = vec![spawn_session_sweeper(
            self.state.engine.store().clone(),
            Duration::from_secs(session.idle_timeout_secs),
            Duration::from_secs(session.sweep_interval_secs.max(1)),
        )];

        let refresh_secs = self.state.config.menu.refresh_interval_secs;
        if let (Some(source), true) = (&self.menu_source, refresh_secs > 0) {
            jobs.push(menu_source::spawn_refresh(
                source.clone(),
                self.state.engine.menu().clone(),
                Duration::from_secs(refresh_secs),
            ));
        }

        tracing::info!("🍽️  Orderbot gateway listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()));

        for job in jobs {
            job.abort();
        }
        tracing::info!("Gateway stopped");
        served
    }

    // HTTP handlers

    async fn handle_verify(
        State(state): State<Arc<GatewayState>>,
        Query(query): Query<VerifyQuery>,
    ) -> impl IntoResponse {
        match query.challenge_for(&state.config.verify_token) {
            Some(challenge) => {
                tracing::info!("Webhook verified");
                (StatusCode::OK, challenge.to_string())
            }
            None => {
                tracing::warn!("Webhook verification rejected");
                (StatusCode::FORBIDDEN, String::new())
            }
        }
    }

    async fn handle_meta_webhook(
        State(state): State<Arc<GatewayState>>,
        body: Bytes,
    ) -> StatusCode {
        // Meta retries anything but 200, so malformed bodies are acknowledged too.
        let payload: MetaPayload = match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Unrecognized webhook payload: {}", e);
                return StatusCode::OK;
            }
        };

        if let Some(event) = payload.into_event() {
            state.handle_inbound(Channel::WhatsAppCloud, event).await;
        }
        StatusCode::OK
    }

    async fn handle_twilio_webhook(
        State(state): State<Arc<GatewayState>>,
        form: std::result::Result<Form<TwilioForm>, FormRejection>,
    ) -> StatusCode {
        // Same policy as the Meta endpoint: a rejected body would be retried.
        let form = match form {
            Ok(Form(form)) => form,
            Err(e) => {
                tracing::warn!("Unrecognized Twilio payload: {}", e);
                return StatusCode::OK;
            }
        };

        if let Some(event) = form.into_event() {
            state.handle_inbound(Channel::Twilio, event).await;
        }
        StatusCode::OK
    }

    async fn handle_health() -> impl IntoResponse {
        axum::Json(serde_json::json!({
            "status": "healthy",
            "version": crate::VERSION
        }))
    }

    async fn handle_status(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
        let menu = state.engine.menu().snapshot();
        let uptime = Utc::now().signed_duration_since(state.started_at);

        axum::Json(serde_json::json!({
            "version": crate::VERSION,
            "uptime_secs": uptime.num_seconds(),
            "sessions": state.engine.store().session_count(),
            "menu": {
                "available": !menu.is_empty(),
                "business_name": menu.business_name(),
                "sections": menu.sections(),
                "items": menu.item_count(),
            },
            "senders": {
                "whatsapp": state.senders.whatsapp.name(),
                "twilio": state.senders.twilio.name(),
            },
            "payment_provider": state.dispatcher.payment_provider(),
        }))
    }
}

/// Periodically drop sessions idle longer than `idle`
pub fn spawn_session_sweeper(
    store: Arc<dyn SessionStore>,
    idle: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let purged = store.purge_idle(idle);
            if purged > 0 {
                tracing::info!(purged, remaining = store.session_count(), "Idle sessions swept");
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Gateway shutdown initiated");
}
