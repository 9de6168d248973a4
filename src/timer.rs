use std::time::{Duration, Instant};

/// Monotonic timer measuring time since creation or since the last reset,
/// plus one split that can be started and read independently.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    created: Instant,
    split: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            created: now,
            split: now,
        }
    }

    pub fn reset(&mut self) {
        self.created = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn milliseconds(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    pub fn microseconds(&self) -> u64 {
        self.elapsed().as_micros() as u64
    }

    /// Starts the split measured by [`split_milliseconds`](Self::split_milliseconds)
    /// and [`split_microseconds`](Self::split_microseconds).
    pub fn start_split(&mut self) {
        self.split = Instant::now();
    }

    pub fn split(&self) -> Duration {
        self.split.elapsed()
    }

    pub fn split_milliseconds(&self) -> u64 {
        self.split().as_millis() as u64
    }

    pub fn split_microseconds(&self) -> u64 {
        self.split().as_micros() as u64
    }
}
