use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Every use of "now" routes through this trait so cooldowns and the digest
/// scheduler can be driven deterministically in tests rather than racing
/// the wall clock.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_utc(&self) -> DateTime<Utc>;
    fn now_instant(&self) -> Instant;
}

/// The production clock, backed by the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_instant(&self) -> Instant {
        Instant::now()
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

/// A manually advanced clock for deterministic scheduler/cooldown tests.
#[derive(Debug)]
pub struct TestClock {
    inner: parking_lot::Mutex<TestClockState>,
}

#[derive(Debug)]
struct TestClockState {
    utc: DateTime<Utc>,
    instant: Instant,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            inner: parking_lot::Mutex::new(TestClockState {
                utc: start,
                instant: Instant::now(),
            }),
        })
    }

    pub fn advance(&self, delta: Duration) {
        let mut state = self.inner.lock();
        state.utc += chrono::Duration::from_std(delta).expect("duration fits chrono range");
        state.instant += delta;
    }

    pub fn set_utc(&self, value: DateTime<Utc>) {
        self.inner.lock().utc = value;
    }
}

impl Clock for TestClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.inner.lock().utc
    }

    fn now_instant(&self) -> Instant {
        self.inner.lock().instant
    }
}
