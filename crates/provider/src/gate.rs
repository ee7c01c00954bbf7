//! Windowed threshold that decides when a full reconnect is warranted.
//!
//! A single operation bouncing off the wrong node is usually noise: the next
//! pushed configuration fixes it. Many of them within a short window mean the
//! client's view of the cluster is badly stale and the whole configuration
//! connection should be re-established from the seed list. The gate counts
//! such events and fires once per `max_hits` within `window`.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Counter state guarded by the gate.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectState {
    pub consecutive_threshold_hits: u32,
    pub window_start: Instant,
}

#[derive(Debug)]
pub struct ReconnectGate {
    max_hits: u32,
    window: Duration,
    state: Mutex<ReconnectState>,
}

impl ReconnectGate {
    pub fn new(max_hits: u32, window: Duration) -> Self {
        Self {
            max_hits: max_hits.max(1),
            window,
            state: Mutex::new(ReconnectState {
                consecutive_threshold_hits: 0,
                window_start: Instant::now(),
            }),
        }
    }

    /// Record one threshold-worthy event.
    ///
    /// Returns `true` on the `max_hits`-th event inside the current window
    /// and resets the counter; returns `false` otherwise. A window that
    /// expires before reaching the threshold is discarded silently. Each call
    /// is counted exactly once, whatever the number of concurrent callers.
    pub fn hit(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();

        if state.consecutive_threshold_hits > 0
            && now.duration_since(state.window_start) > self.window
        {
            debug!(
                hits = state.consecutive_threshold_hits,
                "reconnect window expired below threshold"
            );
            state.consecutive_threshold_hits = 0;
        }
        if state.consecutive_threshold_hits == 0 {
            state.window_start = now;
        }

        state.consecutive_threshold_hits += 1;
        if state.consecutive_threshold_hits >= self.max_hits {
            info!(
                hits = state.consecutive_threshold_hits,
                window_ms = self.window.as_millis() as u64,
                "reconnect threshold reached"
            );
            state.consecutive_threshold_hits = 0;
            state.window_start = now;
            return true;
        }
        false
    }

    pub fn state(&self) -> ReconnectState {
        *self.state.lock()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_on_max_hit() {
        let gate = ReconnectGate::new(10, Duration::from_secs(10));
        for _ in 0..9 {
            assert!(!gate.hit());
        }
        assert!(gate.hit());
        assert_eq!(gate.state().consecutive_threshold_hits, 0);
        // Counting starts over after firing.
        for _ in 0..9 {
            assert!(!gate.hit());
        }
        assert!(gate.hit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_resets_counter() {
        let gate = ReconnectGate::new(10, Duration::from_secs(10));
        for _ in 0..9 {
            assert!(!gate.hit());
        }
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!gate.hit());
        assert_eq!(gate.state().consecutive_threshold_hits, 1);
        for _ in 0..8 {
            assert!(!gate.hit());
        }
        assert!(gate.hit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hits_within_window_accumulate() {
        let gate = ReconnectGate::new(3, Duration::from_secs(10));
        assert!(!gate.hit());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!gate.hit());
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(gate.hit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_of_one_always_fires() {
        let gate = ReconnectGate::new(1, Duration::from_secs(10));
        assert!(gate.hit());
        assert!(gate.hit());
    }

    #[test]
    fn test_concurrent_hits_fire_exactly_once_per_threshold() {
        let gate = Arc::new(ReconnectGate::new(10, Duration::from_secs(3600)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || (0..125).filter(|_| gate.hit()).count())
            })
            .collect();
        let fired: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // 1000 hits, threshold 10.
        assert_eq!(fired, 100);
    }
}
