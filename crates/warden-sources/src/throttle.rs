//! Fixed-window request throttle.
//!
//! Complements the lockout ladder: the ladder punishes repeated *failures*,
//! while this caps raw request volume per key inside a short window (the
//! XML-RPC and scheduled-task surfaces both need one). Windows are anchored
//! at the first hit and reset when they lapse.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

struct WindowSlot {
    count: u32,
    expires_at: DateTime<Utc>,
}

/// Per-key fixed-window counter.
pub struct FixedWindowThrottle {
    limit: u32,
    window_secs: i64,
    slots: Mutex<HashMap<String, WindowSlot>>,
}

impl FixedWindowThrottle {
    pub fn new(limit: u32, window_secs: i64) -> Self {
        Self {
            limit,
            window_secs,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one hit for `key`; returns `true` when the key is over its
    /// limit for the current window.
    pub fn hit(&self, key: &str, now: DateTime<Utc>) -> bool {
        let Ok(mut slots) = self.slots.lock() else {
            // Poisoned lock: fail open, the lockout ladder still stands.
            return false;
        };
        match slots.get_mut(key) {
            Some(slot) if slot.expires_at > now => {
                slot.count = slot.count.saturating_add(1);
                slot.count > self.limit
            }
            _ => {
                slots.insert(
                    key.to_string(),
                    WindowSlot {
                        count: 1,
                        expires_at: now + Duration::seconds(self.window_secs),
                    },
                );
                self.limit == 0
            }
        }
    }

    /// Drops the key's current window.
    pub fn reset(&self, key: &str) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(key);
        }
    }

    /// Removes lapsed windows; returns how many were dropped.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let Ok(mut slots) = self.slots.lock() else {
            return 0;
        };
        let before = slots.len();
        slots.retain(|_, slot| slot.expires_at > now);
        before - slots.len()
    }
}
