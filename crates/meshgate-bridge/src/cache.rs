//! Retransmission cache for inbound APRS messages
//!
//! APRS stations resend a message until they hear an ack, and APRS-IS may
//! deliver the same line through more than one server. Every copy must be
//! acked again (the previous ack may have been lost), but the mesh user
//! should see the text once.
//!
//! Messages are identified by `(sender, msg_no, text)`. Messages without a
//! number cannot be told apart from a deliberate repeat and are never
//! treated as duplicates.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use meshgate_aprs::AprsPacket;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default number of remembered messages
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default window in which a resend counts as a duplicate
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Key for retransmission cache entries
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct RetransmissionKey {
    /// Sender call sign
    pub sender: String,
    /// Message number
    pub msg_no: String,
    /// Message text
    pub text: String,
}

impl RetransmissionKey {
    /// Create a key from raw components
    pub fn new(
        sender: impl Into<String>,
        msg_no: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            msg_no: msg_no.into(),
            text: text.into(),
        }
    }

    /// Key of a numbered message packet
    pub fn from_packet(packet: &AprsPacket) -> Option<Self> {
        Some(Self::new(
            packet.from.clone(),
            packet.msg_no.clone()?,
            packet.message_text.clone().unwrap_or_default(),
        ))
    }
}

impl std::fmt::Display for RetransmissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{{}", self.sender, self.msg_no)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    first_seen: Instant,
    seen_count: u32,
}

/// LRU-bounded retransmission cache with TTL expiration
#[derive(Debug)]
pub struct RetransmissionCache {
    cache: LruCache<RetransmissionKey, CacheEntry>,
    ttl: Duration,
}

impl RetransmissionCache {
    /// Create a cache with default settings
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    /// Create with custom capacity and TTL
    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(cap),
            ttl,
        }
    }

    /// Check if a message was already seen within the TTL
    ///
    /// Returns `false` and records the message when it is new.
    pub fn is_duplicate(&mut self, key: &RetransmissionKey) -> bool {
        let now = Instant::now();

        if let Some(entry) = self.cache.get_mut(key) {
            if now.duration_since(entry.first_seen) > self.ttl {
                trace!(key = %key, "Cache entry expired, treating as new");
                entry.first_seen = now;
                entry.seen_count = 1;
                return false;
            }

            entry.seen_count += 1;
            debug!(key = %key, seen_count = entry.seen_count, "Retransmission detected");
            return true;
        }

        let evicted = self.cache.push(
            key.clone(),
            CacheEntry {
                first_seen: now,
                seen_count: 1,
            },
        );
        if let Some((old, _)) = evicted {
            trace!(key = %old, "Evicted oldest cache entry");
        }
        trace!(key = %key, "New message recorded");
        false
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for RetransmissionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(sender: &str, msg_no: &str) -> RetransmissionKey {
        RetransmissionKey::new(sender, msg_no, "hello")
    }

    #[test]
    fn test_key_from_packet() {
        let packet = meshgate_aprs::parse("N0CALL-9>APRS,TCPIP*::N0CALL-5 :hello{42").unwrap();
        let key = RetransmissionKey::from_packet(&packet).unwrap();
        assert_eq!(key, RetransmissionKey::new("N0CALL-9", "42", "hello"));
        assert_eq!(key.to_string(), "N0CALL-9{42");

        let unnumbered = meshgate_aprs::parse("N0CALL-9>APRS,TCPIP*::N0CALL-5 :hello").unwrap();
        assert!(RetransmissionKey::from_packet(&unnumbered).is_none());
    }

    #[test]
    fn test_cache_duplicate_detection() {
        let mut cache = RetransmissionCache::new();
        let k = key("N0CALL-9", "1");

        assert!(!cache.is_duplicate(&k));
        assert!(cache.is_duplicate(&k));
        assert!(cache.is_duplicate(&k));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_different_messages() {
        let mut cache = RetransmissionCache::new();

        assert!(!cache.is_duplicate(&key("N0CALL-9", "1")));
        assert!(!cache.is_duplicate(&key("N0CALL-9", "2")));
        assert!(!cache.is_duplicate(&key("N0CALL-8", "1")));
        assert!(!cache.is_duplicate(&RetransmissionKey::new("N0CALL-9", "1", "other")));
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_cache_lru_eviction() {
        let mut cache = RetransmissionCache::with_capacity_and_ttl(3, DEFAULT_TTL);

        cache.is_duplicate(&key("A", "1"));
        cache.is_duplicate(&key("B", "1"));
        cache.is_duplicate(&key("C", "1"));
        cache.is_duplicate(&key("D", "1"));

        assert_eq!(cache.len(), 3);
        assert!(cache.is_duplicate(&key("D", "1")));
        assert!(!cache.is_duplicate(&key("A", "1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_ttl_expiration() {
        let mut cache = RetransmissionCache::new();
        let k = key("N0CALL-9", "7");

        assert!(!cache.is_duplicate(&k));
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.is_duplicate(&k));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cache.is_duplicate(&k));
        assert!(cache.is_duplicate(&k));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut cache = RetransmissionCache::with_capacity_and_ttl(0, DEFAULT_TTL);
        cache.is_duplicate(&key("A", "1"));
        cache.is_duplicate(&key("B", "1"));
        assert_eq!(cache.len(), 1);
    }
}
