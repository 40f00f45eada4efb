use std::time::{Duration, Instant, SystemTime};

/// Utility for keeping track of the time it took to perform some operation.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    /// wall-clock time of the last reset, for result records
    started_at: SystemTime,
    /// monotonic time of the last reset, for measuring durations
    start: Instant,
}

impl Timer {
    /// Create a new `Timer`.
    pub fn now() -> Self {
        Self {
            started_at: SystemTime::now(),
            start: Instant::now(),
        }
    }

    /// Reset internal timer to now.
    pub fn reset(&mut self) {
        *self = Self::now();
    }

    /// Wall-clock time at which the timer was last reset.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Time elapsed since the timer was last reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Print a message with the elapsed time since the timer was last reset.
    pub fn print_elapsed(&self, task: &str) {
        eprintln!("{} took {:?}", task, self.elapsed());
    }
}

#[cfg(test)]
mod test {
    use super::Timer;
    use std::time::Duration;

    #[test]
    fn test_reset_moves_start_forward() {
        let mut timer = Timer::now();
        let first = timer.started_at();
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.elapsed() >= Duration::from_millis(5));
        timer.reset();
        assert!(timer.started_at() >= first);
        assert!(timer.elapsed() < Duration::from_secs(5));
    }
}
