use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;

const STATE_LENGTH: usize = 32;

/// OAuth `state` values handed out with a consent URL and not yet returned.
/// Each value is accepted once, within its time to live.
pub struct PendingStates {
    states: Mutex<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
}

impl Default for PendingStates {
    fn default() -> Self {
        Self::new(Duration::minutes(10))
    }
}

impl PendingStates {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn issue(&self) -> String {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LENGTH)
            .map(char::from)
            .collect();

        let now = Utc::now();
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.retain(|_, expires_at| *expires_at > now);
        states.insert(state.clone(), now + self.ttl);
        state
    }

    /// Removes the state and reports whether it was pending and unexpired.
    pub fn consume(&self, state: &str) -> bool {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states
            .remove(state)
            .is_some_and(|expires_at| expires_at > Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_single_use() {
        let pending = PendingStates::default();
        let state = pending.issue();
        assert_eq!(state.len(), STATE_LENGTH);
        assert!(pending.consume(&state));
        assert!(!pending.consume(&state));
        assert!(!pending.consume("never-issued"));
    }

    #[test]
    fn test_expired_state_is_rejected() {
        let pending = PendingStates::new(Duration::seconds(-1));
        let state = pending.issue();
        assert!(!pending.consume(&state));
    }
}
