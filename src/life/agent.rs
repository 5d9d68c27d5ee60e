use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::activity::ActivityMonitor;
use super::behavior::{AgentCtx, AgentKind, Behavior, Cue, Gate, Tuning, fire_chance};
use super::conductor::Conductor;
use super::event::BroadcastEvent;
use super::synth::{OUTPUT, Synth, SynthCommand, SynthError};
use super::tasks::TaskQueue;
use crate::core::music::scale_notes;
use crate::core::random::Randomness;
use crate::core::timebase::{Clock, Millis};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent `{agent}`: min interval {min_ms} ms exceeds max interval {max_ms} ms")]
    InvalidIntervals {
        agent: String,
        min_ms: Millis,
        max_ms: Millis,
    },
    #[error("agent `{agent}`: volume {volume} is outside [0, 1]")]
    InvalidVolume { agent: String, volume: f32 },
    #[error("agent `{agent}` played before init()")]
    NotInitialized { agent: String },
    #[error("agent name `{0}` is already registered")]
    DuplicateName(String),
    #[error("no agent named `{0}`")]
    UnknownAgent(String),
    #[error(transparent)]
    Synth(#[from] SynthError),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentTiming {
    pub enabled: bool,
    pub min_interval_ms: Millis,
    pub max_interval_ms: Millis,
    pub volume: f32,
}

/// Collaborators shared by every agent of an ensemble.
#[derive(Clone, Debug)]
pub struct AgentDeps {
    pub clock: Rc<dyn Clock>,
    pub conductor: Rc<Conductor>,
    pub activity: Rc<ActivityMonitor>,
}

/// Gate-and-cooldown policy shared by all variants.
///
/// The variant is an injected [`Behavior`]; it decides what sound to make and
/// may add vetoes or an alternative to the shared gate, but the trigger
/// commit, cooldown bookkeeping and teardown always happen here.
#[derive(Debug)]
pub struct Agent {
    name: String,
    clock: Rc<dyn Clock>,
    conductor: Rc<Conductor>,
    activity: Rc<ActivityMonitor>,
    rng: Randomness,
    synth: Box<dyn Synth>,
    behavior: Box<dyn Behavior>,
    tasks: TaskQueue<Cue>,
    enabled: bool,
    min_interval_ms: Millis,
    max_interval_ms: Millis,
    last_play_time: Millis,
    is_playing: bool,
    volume: f32,
    initialized: bool,
    disposed: bool,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        timing: AgentTiming,
        behavior: Box<dyn Behavior>,
        synth: Box<dyn Synth>,
        deps: AgentDeps,
        rng: Randomness,
    ) -> Result<Self, AgentError> {
        let name = name.into();
        check_intervals(&name, timing.min_interval_ms, timing.max_interval_ms)?;
        if !(0.0..=1.0).contains(&timing.volume) {
            return Err(AgentError::InvalidVolume {
                agent: name,
                volume: timing.volume,
            });
        }
        Ok(Self {
            name,
            clock: deps.clock,
            conductor: deps.conductor,
            activity: deps.activity,
            rng,
            synth,
            behavior,
            tasks: TaskQueue::new(),
            enabled: timing.enabled,
            min_interval_ms: timing.min_interval_ms,
            max_interval_ms: timing.max_interval_ms,
            last_play_time: 0,
            is_playing: false,
            volume: timing.volume,
            initialized: false,
            disposed: false,
        })
    }

    /// Agent of a built-in variant, named after it.
    pub fn of_kind(
        kind: AgentKind,
        timing: AgentTiming,
        synth: Box<dyn Synth>,
        deps: AgentDeps,
        rng: Randomness,
    ) -> Result<Self, AgentError> {
        Self::new(kind.name(), timing, kind.behavior(), synth, deps, rng)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AgentKind {
        self.behavior.kind()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn last_play_time(&self) -> Millis {
        self.last_play_time
    }

    pub fn min_interval_ms(&self) -> Millis {
        self.min_interval_ms
    }

    pub fn max_interval_ms(&self) -> Millis {
        self.max_interval_ms
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn behavior(&self) -> &dyn Behavior {
        self.behavior.as_ref()
    }

    pub fn behavior_as<T: 'static>(&self) -> Option<&T> {
        self.behavior.as_any().downcast_ref::<T>()
    }

    /// Fire probability after `elapsed_ms` under this agent's intervals.
    pub fn fire_chance(&self, elapsed_ms: Millis) -> f32 {
        fire_chance(elapsed_ms, self.min_interval_ms, self.max_interval_ms)
    }

    /// Wire the synthesis voices. Must precede the first `play`.
    pub fn init(&mut self) -> Result<(), AgentError> {
        self.synth.init(self.behavior.voices())?;
        self.initialized = true;
        debug!(target: "drift::agent", agent = %self.name, "initialized");
        Ok(())
    }

    /// One driver tick: due cues, then the trigger decision, then the
    /// variant's per-tick hook. Returns whether a trigger was committed.
    pub fn update(&mut self, delta_ms: f32) -> Result<bool, AgentError> {
        if self.disposed {
            return Ok(false);
        }
        let now = self.clock.now_ms();
        self.run_due(now);
        if !self.enabled {
            return Ok(false);
        }
        let fired = if self.should_play() {
            self.play()?
        } else {
            false
        };
        self.with_ctx(now, |behavior, ctx| behavior.on_tick(delta_ms, ctx));
        Ok(fired)
    }

    fn run_due(&mut self, now: Millis) {
        while let Some(task) = self.tasks.pop_due(now) {
            trace!(target: "drift::agent", agent = %self.name, cue = ?task.cue, fire_at = task.fire_at);
            self.with_ctx(now, |behavior, ctx| behavior.on_cue(task.cue, ctx));
        }
    }

    pub fn should_play(&mut self) -> bool {
        if !self.enabled || self.disposed {
            return false;
        }
        let mut gate = Gate {
            now: self.clock.now_ms(),
            state: self.conductor.state(),
            activity: &self.activity,
            rng: &mut self.rng,
            conductor: &self.conductor,
            enabled: self.enabled,
            last_play_time: self.last_play_time,
            min_interval_ms: self.min_interval_ms,
            max_interval_ms: self.max_interval_ms,
        };
        self.behavior.should_play(&mut gate)
    }

    /// Commit a trigger and start the variant's sound.
    ///
    /// Returns `Ok(false)` without touching any state when the governor
    /// refuses the commit.
    pub fn play(&mut self) -> Result<bool, AgentError> {
        if !self.initialized || self.disposed {
            return Err(AgentError::NotInitialized {
                agent: self.name.clone(),
            });
        }
        if !self.conductor.try_commit_trigger() {
            debug!(target: "drift::agent", agent = %self.name, "trigger deferred by governor");
            return Ok(false);
        }
        let now = self.clock.now_ms();
        self.last_play_time = now;
        self.is_playing = true;
        self.activity.mark_event();
        info!(target: "drift::agent", agent = %self.name, at_ms = now, "trigger");
        self.with_ctx(now, |behavior, ctx| behavior.on_fire(ctx));
        Ok(true)
    }

    /// Silence the agent and cancel every scheduled cue. Safe to repeat.
    pub fn stop(&mut self) {
        if self.disposed {
            return;
        }
        let cancelled = self.tasks.cancel_all();
        self.is_playing = false;
        let now = self.clock.now_ms();
        self.with_ctx(now, |behavior, ctx| behavior.on_stop(ctx));
        if cancelled > 0 {
            debug!(target: "drift::agent", agent = %self.name, cancelled, "stopped");
        }
    }

    pub fn receive(&mut self, event: &BroadcastEvent) {
        trace!(target: "drift::agent", agent = %self.name, %event, "broadcast received");
        let mut tuning = Tuning::default();
        self.behavior.on_event(event, &mut tuning);
        self.apply_tuning(tuning);
    }

    fn apply_tuning(&mut self, tuning: Tuning) {
        if tuning.min_interval_ms.is_some() || tuning.max_interval_ms.is_some() {
            let min = tuning.min_interval_ms.unwrap_or(self.min_interval_ms);
            let max = tuning.max_interval_ms.unwrap_or(self.max_interval_ms);
            if let Err(err) = self.set_intervals(min, max) {
                warn!(target: "drift::agent", error = %err, "interval change ignored");
            }
        }
        if let Some(flag) = tuning.enabled {
            self.set_enabled(flag);
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.stop();
        }
        if self.enabled != enabled {
            debug!(target: "drift::agent", agent = %self.name, enabled, "enabled changed");
        }
        self.enabled = enabled;
    }

    pub fn set_intervals(&mut self, min_ms: Millis, max_ms: Millis) -> Result<(), AgentError> {
        check_intervals(&self.name, min_ms, max_ms)?;
        self.min_interval_ms = min_ms;
        self.max_interval_ms = max_ms;
        Ok(())
    }

    /// Clamp to [0, 1] and ramp the output gain there over `ramp_sec`.
    pub fn set_volume(&mut self, volume: f32, ramp_sec: f32) -> Result<(), AgentError> {
        if !volume.is_finite() {
            return Err(AgentError::InvalidVolume {
                agent: self.name.clone(),
                volume,
            });
        }
        self.volume = volume.clamp(0.0, 1.0);
        if self.initialized && !self.disposed {
            self.synth.send(
                OUTPUT,
                SynthCommand::Ramp {
                    target: self.volume,
                    time_sec: ramp_sec.max(0.0),
                },
            );
        }
        Ok(())
    }

    pub fn scale_notes(&self, octaves: u8) -> Vec<u8> {
        let state = self.conductor.state();
        scale_notes(state.harmonic_center, state.scale, octaves)
    }

    /// Note `degree_offset` scale steps from the middle of a three-octave
    /// list, clamped to the list.
    pub fn scale_note(&self, degree_offset: i32) -> u8 {
        let notes = self.scale_notes(3);
        let mid = (notes.len() / 2) as i64;
        let idx = (mid + degree_offset as i64).clamp(0, notes.len() as i64 - 1) as usize;
        notes[idx]
    }

    /// Stop, then release the synthesis voices. Only the first call acts.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.stop();
        self.synth.dispose();
        self.disposed = true;
        self.initialized = false;
        debug!(target: "drift::agent", agent = %self.name, "disposed");
    }

    fn with_ctx<R>(
        &mut self,
        now: Millis,
        f: impl FnOnce(&mut dyn Behavior, &mut AgentCtx<'_>) -> R,
    ) -> R {
        let mut ctx = AgentCtx {
            agent: &self.name,
            now,
            state: self.conductor.state(),
            activity: &self.activity,
            rng: &mut self.rng,
            synth: self.synth.as_mut(),
            tasks: &mut self.tasks,
            playing: &mut self.is_playing,
        };
        f(self.behavior.as_mut(), &mut ctx)
    }
}

fn check_intervals(agent: &str, min_ms: Millis, max_ms: Millis) -> Result<(), AgentError> {
    if min_ms > max_ms {
        return Err(AgentError::InvalidIntervals {
            agent: agent.to_string(),
            min_ms,
            max_ms,
        });
    }
    Ok(())
}
