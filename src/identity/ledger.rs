//! Pending handshake secrets with TTL-based expiry.
//!
//! Entries are single-use: the callback takes the secret out. Anything the
//! user never came back for is swept once it expires.

use super::{HandshakeKey, HandshakeSecret};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default lifetime of a pending handshake: 10 minutes.
pub const DEFAULT_HANDSHAKE_TTL_SECS: u64 = 600;

/// Upper bound on pending handshakes; oldest is evicted beyond this.
const MAX_PENDING: usize = 1024;

struct Slot {
    secret: HandshakeSecret,
    inserted_at: Instant,
    /// `None` when the TTL runs past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

pub struct HandshakeLedger {
    slots: Mutex<HashMap<HandshakeKey, Slot>>,
    ttl: Duration,
}

impl HandshakeLedger {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_HANDSHAKE_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn insert(&self, key: HandshakeKey, secret: HandshakeSecret) {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        slots.retain(|_, slot| slot.is_live(now));

        if slots.len() >= MAX_PENDING {
            let oldest = slots
                .iter()
                .min_by_key(|(_, slot)| slot.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                slots.remove(&oldest);
            }
        }

        slots.insert(
            key,
            Slot {
                secret,
                inserted_at: now,
                expires_at: now.checked_add(self.ttl),
            },
        );
    }

    /// Remove and return the secret, if present and unexpired.
    pub fn take(&self, key: &HandshakeKey) -> Option<HandshakeSecret> {
        let slot = self.slots.lock().remove(key)?;
        slot.is_live(Instant::now()).then_some(slot.secret)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandshakeLedger {
    fn default() -> Self {
        Self::new()
    }
}
