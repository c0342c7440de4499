// Keep-alive timer
// A single debounced deadline: every delay() pushes the next ping out by the full period.

use std::time::Duration;
use tokio::time::Instant;

use crate::constants::PING_DELAY_SECS;

#[derive(Debug, Clone)]
pub struct PingTimer {
    period: Duration,
    deadline: Option<Instant>,
}

impl Default for PingTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(PING_DELAY_SECS))
    }
}

impl PingTimer {
    pub fn new(period: Duration) -> Self {
        PingTimer {
            period,
            deadline: None,
        }
    }

    /// Restart the countdown, replacing any pending deadline
    pub fn delay(&mut self) {
        self.deadline = Some(Instant::now() + self.period);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(d) if now >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_delay_debounces() {
        let mut ping = PingTimer::default();
        ping.delay();

        // activity every 2s keeps pushing the ping out
        for _ in 0..10 {
            tokio::time::advance(Duration::from_secs(2)).await;
            assert!(!ping.is_due(Instant::now()));
            ping.delay();
        }

        tokio::time::advance(Duration::from_millis(4999)).await;
        assert!(!ping.is_due(Instant::now()));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(ping.is_due(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let mut ping = PingTimer::new(Duration::from_secs(1));
        assert!(ping.deadline().is_none());
        ping.delay();
        ping.cancel();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!ping.is_due(Instant::now()));
    }
}
