//! Per-command, per-user cooldown tracking.
//!
//! Expiries use `tokio::time::Instant` so tests run under paused time.
//! Entries are created on first successful execution and overwritten on each
//! subsequent one; there is no eviction, expired entries simply read as
//! off-cooldown.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

#[derive(Default)]
pub struct CooldownTracker {
    expiries: DashMap<(String, String), Instant>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A user is on cooldown iff now is strictly before the stored expiry.
    pub fn on_cooldown(&self, command: &str, user_id: &str) -> bool {
        self.expiries
            .get(&(command.to_string(), user_id.to_string()))
            .map(|expiry| Instant::now() < *expiry)
            .unwrap_or(false)
    }

    /// Arms the cooldown at now + `duration`. A zero duration never arms.
    pub fn arm(&self, command: &str, user_id: &str, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        self.expiries.insert(
            (command.to_string(), user_id.to_string()),
            Instant::now() + duration,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_unarmed_is_off_cooldown() {
        let tracker = CooldownTracker::new();
        assert!(!tracker.on_cooldown("tip", "alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_and_expire() {
        let tracker = CooldownTracker::new();
        tracker.arm("tip", "alice", Duration::from_secs(5));

        assert!(tracker.on_cooldown("tip", "alice"));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(tracker.on_cooldown("tip", "alice"));

        // expiry is exclusive: at exactly C seconds the command is usable again
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!tracker.on_cooldown("tip", "alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldowns_are_per_user_and_per_command() {
        let tracker = CooldownTracker::new();
        tracker.arm("tip", "alice", Duration::from_secs(5));

        assert!(tracker.on_cooldown("tip", "alice"));
        assert!(!tracker.on_cooldown("tip", "bob"));
        assert!(!tracker.on_cooldown("roll", "alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_never_arms() {
        let tracker = CooldownTracker::new();
        tracker.arm("tip", "alice", Duration::ZERO);
        assert!(!tracker.on_cooldown("tip", "alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_overwrites_expiry() {
        let tracker = CooldownTracker::new();
        tracker.arm("tip", "alice", Duration::from_secs(2));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!tracker.on_cooldown("tip", "alice"));

        tracker.arm("tip", "alice", Duration::from_secs(2));
        assert!(tracker.on_cooldown("tip", "alice"));
    }
}
