//! Duplicate delivery suppression
//!
//! Messaging providers retry webhooks, so the same inbound message can arrive
//! more than once. The ledger remembers provider message ids for a window.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Default retention for seen message ids
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(600);

#[derive(Debug, Default)]
struct Seen {
    ids: HashMap<String, Instant>,
    order: VecDeque<(String, Instant)>,
}

impl Seen {
    fn prune(&mut self, window: Duration) {
        while let Some((id, at)) = self.order.front() {
            if at.elapsed() <= window {
                break;
            }
            // A later re-sighting may have refreshed the id.
            if self.ids.get(id) == Some(at) {
                self.ids.remove(id);
            }
            self.order.pop_front();
        }
    }
}

/// Recently seen inbound message ids
#[derive(Debug)]
pub struct DeliveryLedger {
    window: Duration,
    seen: Mutex<Seen>,
}

impl Default for DeliveryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl DeliveryLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(Seen::default()),
        }
    }

    /// Record `id`; returns false if it was already seen inside the window.
    pub fn first_sighting(&self, id: &str) -> bool {
        let mut seen = self.seen.lock();
        seen.prune(self.window);

        if seen.ids.contains_key(id) {
            return false;
        }
        let now = Instant::now();
        seen.ids.insert(id.to_string(), now);
        seen.order.push_back((id.to_string(), now));
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_detected() {
        let ledger = DeliveryLedger::default();
        assert!(ledger.first_sighting("wamid.1"));
        assert!(!ledger.first_sighting("wamid.1"));
        assert!(ledger.first_sighting("wamid.2"));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_window_expiry() {
        let ledger = DeliveryLedger::new(Duration::from_millis(10));
        assert!(ledger.first_sighting("wamid.1"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(ledger.first_sighting("wamid.1"));
        assert_eq!(ledger.len(), 1);
    }
}
