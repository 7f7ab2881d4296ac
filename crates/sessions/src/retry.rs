use std::collections::HashMap;

use {tokio::sync::RwLock, tracing::info};

/// Bounded reconnect budget per session.
///
/// A reconnect-eligible close consumes one attempt; the counter is cleared
/// only by a successful open or by session deletion — never by the policy
/// itself. This bounds reconnect storms against a permanently revoked
/// session while tolerating transient disconnects.
pub struct ReconnectPolicy {
    max_retries: u32,
    counts: RwLock<HashMap<String, u32>>,
}

impl ReconnectPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// The configured budget, never below one attempt.
    fn effective_max(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Decide whether the session may reconnect. Consumes one attempt and
    /// returns true while the budget lasts; returns false without further
    /// mutation once it is spent.
    pub async fn should_reconnect(&self, id: &str) -> bool {
        let max = self.effective_max();
        let mut counts = self.counts.write().await;
        let count = counts.entry(id.to_string()).or_insert(0);
        if *count < max {
            *count += 1;
            info!(session_id = %id, attempts = *count, "reconnecting");
            true
        } else {
            false
        }
    }

    /// Forget the session's attempts (successful open or deletion).
    pub async fn clear(&self, id: &str) {
        self.counts.write().await.remove(id);
    }

    pub async fn attempts(&self, id: &str) -> u32 {
        self.counts.read().await.get(id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn budget_is_consumed_then_exhausted() {
        let policy = ReconnectPolicy::new(2);
        assert!(policy.should_reconnect("a").await);
        assert!(policy.should_reconnect("a").await);
        assert!(!policy.should_reconnect("a").await);
        // Exhaustion does not mutate further.
        assert_eq!(policy.attempts("a").await, 2);
    }

    #[tokio::test]
    async fn counter_is_non_decreasing_until_cleared() {
        let policy = ReconnectPolicy::new(3);
        let mut last = 0;
        for _ in 0..3 {
            policy.should_reconnect("a").await;
            let now = policy.attempts("a").await;
            assert!(now > last);
            last = now;
        }

        policy.clear("a").await;
        assert_eq!(policy.attempts("a").await, 0);
    }

    #[tokio::test]
    async fn zero_budget_still_allows_one_attempt() {
        let policy = ReconnectPolicy::new(0);
        assert!(policy.should_reconnect("a").await);
        assert!(!policy.should_reconnect("a").await);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let policy = ReconnectPolicy::new(1);
        assert!(policy.should_reconnect("a").await);
        assert!(policy.should_reconnect("b").await);
        assert!(!policy.should_reconnect("a").await);
    }
}
