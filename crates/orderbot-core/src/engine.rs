//! Event entry point: serialize per customer, step the dialogue, commit

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::delivery::DeliveryLedger;
use crate::dialogue::{self, replies, SideEffectCommand};
use crate::intent::{IntentParser, KeywordParser};
use crate::menu::MenuHandle;
use crate::session::{CustomerId, Session, SessionStore};

/// Normalized inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub customer: CustomerId,

    /// Message text; `None` for media or other non-text messages
    pub text: Option<String>,

    /// Provider message id, used to drop duplicate deliveries
    pub message_id: Option<String>,
}

impl InboundEvent {
    pub fn text(customer: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            customer: CustomerId::new(customer),
            text: Some(text.into()),
            message_id: None,
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }
}

/// What the transport should do after an event was handled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub customer: Option<CustomerId>,
    pub replies: Vec<String>,
    pub commands: Vec<SideEffectCommand>,
}

impl Outcome {
    pub fn is_empty(&self) -> bool {
        self.replies.is_empty() && self.commands.is_empty()
    }

    /// Commands that still need an effectful executor
    pub fn payment_requests(&self) -> impl Iterator<Item = (&CustomerId, rust_decimal::Decimal)> {
        self.commands.iter().filter_map(|c| match c {
            SideEffectCommand::RequestPaymentLink { customer, amount } => Some((customer, *amount)),
            _ => None,
        })
    }
}

/// Session and order-intent engine
pub struct OrderEngine {
    store: Arc<dyn SessionStore>,
    menu: MenuHandle,
    parser: Arc<dyn IntentParser>,
    ledger: DeliveryLedger,
}

impl OrderEngine {
    pub fn new(store: Arc<dyn SessionStore>, menu: MenuHandle) -> Self {
        Self {
            store,
            menu,
            parser: Arc::new(KeywordParser),
            ledger: DeliveryLedger::default(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn IntentParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.ledger = DeliveryLedger::new(window);
        self
    }

    pub fn menu(&self) -> &MenuHandle {
        &self.menu
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Handle one inbound message.
    ///
    /// Session changes are committed before this returns; the outcome only
    /// describes deliveries and payment requests still to be carried out.
    pub async fn handle_event(&self, event: InboundEvent) -> Outcome {
        let customer = event.customer;
        let Some(text) = event.text.filter(|t| !t.trim().is_empty()) else {
            tracing::debug!(customer = %customer, "Ignoring event without text");
            return Outcome::default();
        };

        if let Some(id) = event.message_id.as_deref() {
            if !self.ledger.first_sighting(id) {
                tracing::info!(customer = %customer, message_id = id, "Duplicate delivery ignored");
                return Outcome::default();
            }
        }

        let menu = self.menu.snapshot();
        if menu.is_empty() {
            return Outcome {
                customer: Some(customer),
                replies: vec![replies::MENU_UNAVAILABLE.to_string()],
                commands: Vec::new(),
            };
        }

        let mut lease = self.store.acquire(&customer).await;
        let transition = dialogue::step(
            lease.get_or_create(),
            &menu,
            self.parser.as_ref(),
            &text,
        );

        for command in &transition.commands {
            match command {
                SideEffectCommand::DeleteSession { .. } => {
                    lease.delete();
                }
                SideEffectCommand::ResetSession { customer } => {
                    lease.upsert(Session::new(customer.clone()));
                    tracing::info!(customer = %customer, "Session reset");
                }
                SideEffectCommand::RequestPaymentLink { .. } => {}
            }
        }
        drop(lease);

        Outcome {
            customer: Some(customer),
            replies: transition.replies,
            commands: transition.commands,
        }
    }
}
