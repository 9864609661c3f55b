use time::OffsetDateTime;

/// Source of "now". Everything date-sensitive reads time through this so tests
/// can pin the instant.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[cfg(test)]
pub use fixed::FixedClock;

#[cfg(test)]
mod fixed {
    use std::sync::Mutex;

    use time::{Duration, OffsetDateTime};

    use super::Clock;

    #[derive(Debug)]
    pub struct FixedClock(Mutex<OffsetDateTime>);

    impl FixedClock {
        pub fn new(at: OffsetDateTime) -> Self {
            Self(Mutex::new(at))
        }

        pub fn set(&self, at: OffsetDateTime) {
            *self.0.lock().unwrap() = at;
        }

        pub fn advance(&self, by: Duration) {
            let mut guard = self.0.lock().unwrap();
            *guard += by;
        }
    }

    impl Clock for FixedClock {
        fn now_utc(&self) -> OffsetDateTime {
            *self.0.lock().unwrap()
        }
    }
}
