//! Per-customer sessions and the store that serializes access to them

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::cart::Cart;

/// Customer identity (phone number or messaging handle)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CustomerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Conversational state plus cart for one customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Owner of the session
    pub customer: CustomerId,

    /// Greeting has been sent
    pub greeted: bool,

    /// Restaurant bound for this order, set at most once
    selected_restaurant: Option<String>,

    /// Items ordered so far
    pub cart: Cart,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(customer: CustomerId) -> Self {
        let now = Utc::now();
        Self {
            customer,
            greeted: false,
            selected_restaurant: None,
            cart: Cart::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn selected_restaurant(&self) -> Option<&str> {
        self.selected_restaurant.as_deref()
    }

    /// Bind the restaurant for this order. Returns false if one is already
    /// bound; switching requires a reset.
    pub fn bind_restaurant(&mut self, name: impl Into<String>) -> bool {
        if self.selected_restaurant.is_some() {
            return false;
        }
        self.selected_restaurant = Some(name.into());
        true
    }

    /// A cart with a positive total is waiting for yes/no
    pub fn awaiting_confirmation(&self) -> bool {
        self.cart.total() > rust_decimal::Decimal::ZERO
    }

    /// Update last activity
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Check if the session has been idle longer than `timeout`
    pub fn is_idle_for(&self, timeout: Duration) -> bool {
        (Utc::now() - self.last_activity)
            .to_std()
            .map_or(false, |idle| idle > timeout)
    }
}

type Slot = Option<Session>;

/// Exclusive access to one customer's session slot.
///
/// Holding a lease serializes every other event for the same customer;
/// leases for different customers never contend.
pub struct SessionLease {
    customer: CustomerId,
    guard: OwnedMutexGuard<Slot>,
}

impl SessionLease {
    pub fn customer(&self) -> &CustomerId {
        &self.customer
    }

    pub fn session(&self) -> Option<&Session> {
        self.guard.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.guard.as_mut()
    }

    /// The live session, creating a fresh one if none exists
    pub fn get_or_create(&mut self) -> &mut Session {
        if self.guard.is_none() {
            tracing::info!(customer = %self.customer, "Session created");
        }
        let customer = self.customer.clone();
        self.guard.get_or_insert_with(|| Session::new(customer))
    }

    pub fn upsert(&mut self, session: Session) {
        *self.guard = Some(session);
    }

    pub fn delete(&mut self) -> Option<Session> {
        let removed = self.guard.take();
        if removed.is_some() {
            tracing::info!(customer = %self.customer, "Session deleted");
        }
        removed
    }
}

/// Storage for sessions with per-customer serialization
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Wait for exclusive access to the customer's slot
    async fn acquire(&self, customer: &CustomerId) -> SessionLease;

    /// Snapshot of a session, `None` if absent or currently leased
    fn peek(&self, customer: &CustomerId) -> Option<Session>;

    /// Drop sessions idle longer than `timeout`; returns how many went
    fn purge_idle(&self, timeout: Duration) -> usize;

    /// Live session count
    fn session_count(&self) -> usize;
}

/// Process-memory session store
#[derive(Default)]
pub struct InMemorySessionStore {
    slots: Mutex<HashMap<CustomerId, Arc<AsyncMutex<Slot>>>>,
    idle_timeout: Option<Duration>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions idle longer than `timeout` are treated as absent on access
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    fn slot(&self, customer: &CustomerId) -> Arc<AsyncMutex<Slot>> {
        self.slots
            .lock()
            .entry(customer.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn acquire(&self, customer: &CustomerId) -> SessionLease {
        let mut guard = self.slot(customer).lock_owned().await;

        let expired = match (self.idle_timeout, guard.as_ref()) {
            (Some(timeout), Some(session)) => session.is_idle_for(timeout),
            _ => false,
        };
        if expired {
            tracing::info!(customer = %customer, "Session expired after idle timeout");
            *guard = None;
        }

        SessionLease {
            customer: customer.clone(),
            guard,
        }
    }

    fn peek(&self, customer: &CustomerId) -> Option<Session> {
        let slot = self.slots.lock().get(customer).cloned()?;
        let guard = slot.try_lock().ok()?;
        guard.as_ref().cloned()
    }

    fn purge_idle(&self, timeout: Duration) -> usize {
        let mut slots = self.slots.lock();
        let mut purged = 0;

        slots.retain(|customer, slot| {
            // Someone else holds or waits on this slot.
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let Ok(mut guard) = slot.try_lock() else {
                return true;
            };
            match guard.as_ref().map(|s| s.is_idle_for(timeout)) {
                None => false,
                Some(true) => {
                    tracing::info!(customer = %customer, "Session expired and removed");
                    *guard = None;
                    purged += 1;
                    false
                }
                Some(false) => true,
            }
        });

        purged
    }

    fn session_count(&self) -> usize {
        let slots = self.slots.lock();
        slots
            .values()
            .filter(|slot| slot.try_lock().map_or(true, |g| g.is_some()))
            .count()
    }
}
