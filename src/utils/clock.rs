use chrono::{DateTime, Utc};

/// Source of "now" for every state transition.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub mod fixed {
    use super::Clock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Mutex;

    /// Manually advanced clock for tests.
    pub struct FixedClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl FixedClock {
        pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
            let now = Utc
                .with_ymd_and_hms(year, month, day, hour, minute, 0)
                .single()
                .expect("valid test timestamp");
            Self {
                now: Mutex::new(now),
            }
        }

        pub fn set(&self, hour: u32, minute: u32) {
            let mut now = self.now.lock().expect("clock lock");
            let date = now.date_naive();
            *now = Utc.from_utc_datetime(
                &date.and_hms_opt(hour, minute, 0).expect("valid test time"),
            );
        }

        pub fn advance(&self, minutes: i64) {
            let mut now = self.now.lock().expect("clock lock");
            *now += Duration::minutes(minutes);
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().expect("clock lock")
        }
    }
}
