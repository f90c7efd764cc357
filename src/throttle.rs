use std::time::Duration;

/// Rate limiter for diagnostics, driven by whatever clock the caller uses.
#[derive(Debug, Clone)]
pub struct Throttle {
    period: Duration,
    last: Option<Duration>,
}

impl Throttle {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// Returns true if the caller may emit now, and records the emission.
    pub fn ready(&mut self, now: Duration) -> bool {
        match self.last {
            Some(last) if now.saturating_sub(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_fires() {
        let mut throttle = Throttle::new(Duration::from_secs(1));
        assert!(throttle.ready(Duration::from_secs(5)));
    }

    #[test]
    fn test_suppresses_within_period() {
        let mut throttle = Throttle::new(Duration::from_secs(1));
        assert!(throttle.ready(Duration::ZERO));
        assert!(!throttle.ready(Duration::from_millis(500)));
        assert!(!throttle.ready(Duration::from_millis(999)));
        assert!(throttle.ready(Duration::from_millis(1000)));
        assert!(!throttle.ready(Duration::from_millis(1500)));
    }
}
