//! Capped exponential backoff for connection retries.

use std::time::Duration;

/// Delay sequence for failed connect attempts: starts at the initial delay,
/// doubles after each failure, and never exceeds the cap.
///
/// With the defaults (1s initial, 4s cap) the sequence is `1, 2, 4, 4, 4, ...`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self {
            current: initial.min(cap),
            cap,
        }
    }

    /// Returns the delay to sleep before the next attempt and advances the
    /// sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence_is_one_two_four_capped() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 4, 4, 4]);
    }

    #[test]
    fn test_sequence_is_non_decreasing() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(750));
        let mut previous = Duration::ZERO;
        for _ in 0..10 {
            let delay = backoff.next_delay();
            assert!(delay >= previous);
            assert!(delay <= Duration::from_millis(750));
            previous = delay;
        }
    }

    #[test]
    fn test_initial_larger_than_cap_is_clamped() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
    }
}
