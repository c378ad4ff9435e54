use std::time::{Duration, Instant};

/// Measures how long a step of a render request takes.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Start measuring from now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time passed since the stopwatch was started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left until `timeout` has passed since the start, or `None` when it
    /// already has.
    pub fn remaining(&self, timeout: Duration) -> Option<Duration> {
        timeout.checked_sub(self.elapsed()).filter(|d| !d.is_zero())
    }
}

impl std::ops::Sub<Stopwatch> for Stopwatch {
    type Output = Duration;

    fn sub(self, rhs: Stopwatch) -> Self::Output {
        self.started - rhs.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_counts_down_to_none() {
        let stopwatch = Stopwatch::start();

        assert!(stopwatch.remaining(Duration::from_secs(60)).is_some());
        assert!(stopwatch.remaining(Duration::ZERO).is_none());
    }

    #[test]
    fn later_stopwatch_minus_earlier() {
        let earlier = Stopwatch::start();
        std::thread::sleep(Duration::from_millis(2));
        let later = Stopwatch::start();

        assert!(later - earlier >= Duration::from_millis(2));
    }
}
