use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock timestamp in milliseconds.
pub type Millis = u64;

pub fn sec_to_ms(s: f32) -> Millis {
    if !s.is_finite() || s <= 0.0 {
        return 0;
    }
    (s as f64 * 1000.0).round() as Millis
}

pub fn ms_to_sec(ms: Millis) -> f32 {
    ms as f32 / 1000.0
}

/// Source of timestamps for every timing decision in the agent core.
pub trait Clock: std::fmt::Debug {
    fn now_ms(&self) -> Millis;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as Millis)
            .unwrap_or(0)
    }
}

/// Clock advanced explicitly; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, t: Millis) {
        self.now.set(t);
    }

    pub fn advance(&self, dt: Millis) {
        self.now.set(self.now.get().saturating_add(dt));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}
