use chrono::{DateTime, Local, NaiveDate};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of wall-clock and monotonic readings. Lets the timer and controller be driven
/// by a manual clock in tests.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Local>;

    fn instant(&self) -> Instant;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn now_ms(&self) -> u64 {
        self.now().timestamp_millis().max(0) as u64
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    wall: Mutex<DateTime<Local>>,
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            wall: Mutex::new(start),
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move both readings forward
    pub fn advance(&self, by: Duration) {
        if let Ok(mut wall) = self.wall.lock() {
            let step = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
            *wall = *wall + step;
        }
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }

    /// Jump the wall clock only (NTP adjustment, manual change)
    pub fn set_wall(&self, to: DateTime<Local>) {
        if let Ok(mut wall) = self.wall.lock() {
            *wall = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        match self.wall.lock() {
            Ok(wall) => *wall,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn instant(&self) -> Instant {
        let offset = match self.offset.lock() {
            Ok(offset) => *offset,
            Err(poisoned) => *poisoned.into_inner(),
        };
        self.base + offset
    }
}
