//! Count- and time-bounded outcome window.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// The last `max_samples` call outcomes no older than `max_age`.
#[derive(Debug, Clone)]
pub(crate) struct RollingWindow {
    samples: VecDeque<(Instant, bool)>,
    max_samples: usize,
    max_age: Duration,
}

impl RollingWindow {
    pub(crate) fn new(max_samples: usize, max_age: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples.min(256)),
            max_samples,
            max_age,
        }
    }

    pub(crate) fn push(&mut self, at: Instant, success: bool) {
        if self.max_samples == 0 {
            return;
        }
        while self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back((at, success));
        self.prune(at);
    }

    /// Drop samples older than `max_age` relative to `now`.
    pub(crate) fn prune(&mut self, now: Instant) {
        while let Some(&(at, _)) = self.samples.front() {
            if now.saturating_duration_since(at) > self.max_age {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.samples.len()
    }

    /// Fraction of failed samples; 0 when empty.
    pub(crate) fn failure_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let failures = self.samples.iter().filter(|(_, ok)| !ok).count();
        failures as f64 / self.samples.len() as f64
    }

    pub(crate) fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_by_count() {
        let mut window = RollingWindow::new(3, Duration::from_secs(60));
        let now = Instant::now();
        for ok in [false, false, true, true, true] {
            window.push(now, ok);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.failure_rate(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_by_age() {
        let mut window = RollingWindow::new(10, Duration::from_secs(60));
        window.push(Instant::now(), false);
        tokio::time::advance(Duration::from_secs(61)).await;
        window.push(Instant::now(), true);
        assert_eq!(window.len(), 1);
        assert_eq!(window.failure_rate(), 0.0);
    }
}
