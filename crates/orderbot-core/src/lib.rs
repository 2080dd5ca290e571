//! Orderbot Core - Session & Order-Intent Engine
//!
//! The conversational heart of a chat ordering bot: it tracks a cart per
//! customer across a multi-turn dialogue and turns free text into cart edits.
//!
//! # Architecture
//!
//! ```text
//!   (customer, text) ──▶ OrderEngine::handle_event
//!                              │
//!                 ┌────────────┼─────────────────┐
//!                 ▼            ▼                 ▼
//!          DeliveryLedger  SessionStore      MenuHandle
//!          (dup. drops)    (per-customer     (Arc<Menu> snapshot)
//!                           lease)               │
//!                              │                 │
//!                              ▼                 ▼
//!                        dialogue::step ──▶ IntentParser ──▶ Cart
//!                              │
//!                              ▼
//!                 Outcome { replies, commands }
//! ```
//!
//! No network I/O happens here. Sending replies and creating payment links
//! are described by [`SideEffectCommand`]s and [`Outcome::replies`] for the
//! transport layer to carry out.

pub mod cart;
pub mod delivery;
pub mod dialogue;
pub mod engine;
pub mod error;
pub mod intent;
pub mod menu;
pub mod session;

pub use cart::{Cart, CartLine, CartSummary, DeltaOutcome, RenderedLine};
pub use delivery::DeliveryLedger;
pub use dialogue::{replies, InputClass, SideEffectCommand, Stage, Transition};
pub use engine::{InboundEvent, Outcome, OrderEngine};
pub use error::{MenuLoadError, Result};
pub use intent::{
    ChainedParser, FallbackInterpreter, IntentParser, KeywordParser, OrderIntent, Quantities,
    Vocabulary, MAX_QUANTITY,
};
pub use menu::{price_in_range, Menu, MenuHandle, MenuItem, Section};
pub use session::{CustomerId, InMemorySessionStore, Session, SessionLease, SessionStore};

pub use rust_decimal::{Decimal, RoundingStrategy};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
