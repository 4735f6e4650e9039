//! Randomised delay between vendor calls.

use std::time::Duration;

use rand::Rng;

/// Inter-id delay drawn uniformly from `min..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Default for Pacing {
    /// 1.5–2.3 s, slow enough that the vendor has never throttled a run.
    fn default() -> Self {
        Self::from_millis(1500, 2300)
    }
}

impl Pacing {
    /// Bounds given in either order.
    pub fn new(a: Duration, b: Duration) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn from_millis(min: u64, max: u64) -> Self {
        Self::new(Duration::from_millis(min), Duration::from_millis(max))
    }

    /// No delay at all.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn next_delay(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bounds() {
        let p = Pacing::default();
        assert_eq!(p.min(), Duration::from_millis(1500));
        assert_eq!(p.max(), Duration::from_millis(2300));
    }

    #[test]
    fn delays_stay_in_bounds() {
        let p = Pacing::default();
        for _ in 0..200 {
            let d = p.next_delay();
            assert!(d >= p.min() && d <= p.max(), "{d:?}");
        }
    }

    #[test]
    fn reversed_bounds_normalised() {
        let p = Pacing::from_millis(900, 100);
        assert_eq!(p.min(), Duration::from_millis(100));
        assert_eq!(p.max(), Duration::from_millis(900));
    }

    #[test]
    fn fixed_delay_when_bounds_equal() {
        assert_eq!(Pacing::from_millis(5, 5).next_delay(), Duration::from_millis(5));
        assert_eq!(Pacing::none().next_delay(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_sleeps_within_bounds() {
        let p = Pacing::from_millis(1500, 2300);
        let start = tokio::time::Instant::now();
        p.pause().await;
        let slept = start.elapsed();
        assert!(slept >= Duration::from_millis(1500));
        assert!(slept <= Duration::from_millis(2300) + Duration::from_millis(5));
    }
}
