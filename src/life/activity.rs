use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::core::timebase::{Clock, Millis, ms_to_sec};

#[derive(Clone, Copy, Debug)]
pub struct ActivityParams {
    /// Sliding window over which recent triggers are counted.
    pub window_ms: Millis,
    /// Trigger count that reads as a fully crowded room (density 1.0).
    pub saturation_events: usize,
}

impl Default for ActivityParams {
    fn default() -> Self {
        Self {
            window_ms: 10_000,
            saturation_events: 6,
        }
    }
}

/// Tracks recent trigger density across all agents.
#[derive(Debug)]
pub struct ActivityMonitor {
    clock: Rc<dyn Clock>,
    params: ActivityParams,
    events: RefCell<VecDeque<Millis>>,
    last_event: Cell<Millis>,
}

impl ActivityMonitor {
    pub fn new(clock: Rc<dyn Clock>, params: ActivityParams) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            params,
            events: RefCell::new(VecDeque::new()),
            last_event: Cell::new(now),
        }
    }

    pub fn params(&self) -> ActivityParams {
        self.params
    }

    pub fn mark_event(&self) {
        let now = self.clock.now_ms();
        self.last_event.set(now);
        self.events.borrow_mut().push_back(now);
        self.prune(now);
    }

    fn prune(&self, now: Millis) {
        let horizon = now.saturating_sub(self.params.window_ms);
        let mut events = self.events.borrow_mut();
        while let Some(&t) = events.front() {
            if t < horizon {
                events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Normalized recent event density in [0, 1].
    pub fn density(&self) -> f32 {
        if self.params.saturation_events == 0 {
            return 0.0;
        }
        self.prune(self.clock.now_ms());
        let count = self.events.borrow().len() as f32;
        (count / self.params.saturation_events as f32).clamp(0.0, 1.0)
    }

    /// True while the room is not crowded: recent density below `threshold`.
    pub fn has_room(&self, threshold: f32) -> bool {
        self.density() < threshold
    }

    pub fn silence_sec(&self) -> f32 {
        let now = self.clock.now_ms();
        ms_to_sec(now.saturating_sub(self.last_event.get()))
    }

    /// True if no event has occurred for at least `silence_sec` seconds.
    pub fn needs_activity(&self, silence_sec: f32) -> bool {
        self.silence_sec() >= silence_sec
    }

    pub fn reset(&self) {
        self.events.borrow_mut().clear();
        self.last_event.set(self.clock.now_ms());
    }
}
