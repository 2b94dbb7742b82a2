//! Mesh link watchdog
//!
//! Two conditions make the gateway reopen the radio: the stream closed, or
//! no mesh packet for the stall timeout. The stall timer restarts only when
//! a packet arrives or a reconnect succeeds, so a failed reconnect is retried
//! on the next loop iteration.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::WatchdogConfig;

/// Outcome of a watchdog check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// Link is fine
    Healthy,
    /// The radio stream is closed
    LinkClosed,
    /// No packet for this long
    Stalled(Duration),
}

impl WatchdogVerdict {
    /// True when the radio must be reopened
    pub fn needs_reconnect(&self) -> bool {
        !matches!(self, WatchdogVerdict::Healthy)
    }
}

/// Stall and link-closed detector
#[derive(Debug, Clone)]
pub struct Watchdog {
    stall_timeout: Duration,
    reconnect_backoff: Duration,
    last_packet: Instant,
}

impl Watchdog {
    /// Create a watchdog; the stall timer starts now
    pub fn new(config: &WatchdogConfig) -> Self {
        Self {
            stall_timeout: config.stall_timeout,
            reconnect_backoff: config.reconnect_backoff,
            last_packet: Instant::now(),
        }
    }

    /// Record a received mesh packet
    pub fn packet_seen(&mut self) {
        self.last_packet = Instant::now();
    }

    /// Record a successful reconnect
    pub fn reconnected(&mut self) {
        self.last_packet = Instant::now();
    }

    /// Time since the last packet or reconnect
    pub fn silence(&self) -> Duration {
        self.last_packet.elapsed()
    }

    /// Pause between closing and reopening the radio
    pub fn reconnect_backoff(&self) -> Duration {
        self.reconnect_backoff
    }

    /// Check the link
    pub fn check(&self, link_open: bool) -> WatchdogVerdict {
        if !link_open {
            return WatchdogVerdict::LinkClosed;
        }
        let silence = self.silence();
        if silence > self.stall_timeout {
            WatchdogVerdict::Stalled(silence)
        } else {
            WatchdogVerdict::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watchdog() -> Watchdog {
        Watchdog::new(&WatchdogConfig {
            stall_timeout: Duration::from_secs(900),
            reconnect_backoff: Duration::from_secs(30),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_then_stalled() {
        let dog = watchdog();
        assert_eq!(dog.check(true), WatchdogVerdict::Healthy);

        tokio::time::advance(Duration::from_secs(901)).await;
        assert!(matches!(dog.check(true), WatchdogVerdict::Stalled(_)));
        assert!(dog.check(true).needs_reconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn test_packet_resets_timer() {
        let mut dog = watchdog();
        tokio::time::advance(Duration::from_secs(800)).await;
        dog.packet_seen();
        tokio::time::advance(Duration::from_secs(800)).await;
        assert_eq!(dog.check(true), WatchdogVerdict::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_link_wins() {
        let dog = watchdog();
        assert_eq!(dog.check(false), WatchdogVerdict::LinkClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_persists_until_reconnect() {
        let mut dog = watchdog();
        tokio::time::advance(Duration::from_secs(1000)).await;
        assert!(dog.check(true).needs_reconnect());

        // a failed reconnect leaves the timer alone
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(dog.check(true).needs_reconnect());

        dog.reconnected();
        assert_eq!(dog.check(true), WatchdogVerdict::Healthy);
    }
}
