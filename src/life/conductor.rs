use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, info};

use super::event::{BroadcastEvent, Phase};
use crate::core::music::{Scale, midi_to_name};
use crate::core::random::Randomness;
use crate::core::timebase::{Clock, Millis, ms_to_sec};

pub const MIN_ROOT: u8 = 36;
pub const MAX_ROOT: u8 = 60;
const STARTING_ROOTS: [u8; 6] = [48, 50, 52, 53, 55, 57];
const STARTING_SCALES: [Scale; 3] = [Scale::Dorian, Scale::Aeolian, Scale::Mixolydian];
const KEY_STEPS: [i16; 6] = [-7, -5, -2, 2, 5, 7];

/// Shared composition state. Agents only ever see copies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConductorState {
    /// MIDI root note of the current key.
    pub harmonic_center: u8,
    pub scale: Scale,
    /// 0 = dark, 1 = bright.
    pub mood: f32,
    pub tension: f32,
    /// Target activity level.
    pub density: f32,
    pub phase: Phase,
    pub elapsed_sec: f32,
}

impl Default for ConductorState {
    fn default() -> Self {
        Self {
            harmonic_center: 48,
            scale: Scale::Dorian,
            mood: 0.5,
            tension: 0.3,
            density: 0.4,
            phase: Phase::Genesis,
            elapsed_sec: 0.0,
        }
    }
}

/// Minimum spacing between any two committed agent triggers.
#[derive(Clone, Copy, Debug)]
pub struct TriggerGovernor {
    pub last_trigger: Option<Millis>,
    pub min_spacing_ms: Millis,
}

impl TriggerGovernor {
    pub fn new(min_spacing_ms: Millis) -> Self {
        Self {
            last_trigger: None,
            min_spacing_ms,
        }
    }

    pub fn permits(&self, now: Millis) -> bool {
        match self.last_trigger {
            Some(last) => now.saturating_sub(last) >= self.min_spacing_ms && now >= last,
            None => true,
        }
    }

    pub fn commit(&mut self, now: Millis) {
        self.last_trigger = Some(now);
    }

    pub fn try_commit(&mut self, now: Millis) -> bool {
        if !self.permits(now) {
            return false;
        }
        self.commit(now);
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseCue {
    pub at_sec: f32,
    pub phase: Phase,
}

#[derive(Clone, Debug)]
pub struct ConductorParams {
    pub min_agent_spacing_ms: Millis,
    pub max_concurrent_agents: usize,
    /// Drive mood, density and tension from noise on every `evolve`.
    pub evolve_state: bool,
    /// Density movement that triggers a `DensityChange` broadcast.
    pub density_step: f32,
    pub scale_shift_per_sec: f32,
    pub key_change_per_sec: f32,
    pub key_change_notice_sec: f32,
    pub phase_schedule: Vec<PhaseCue>,
}

impl Default for ConductorParams {
    fn default() -> Self {
        Self {
            min_agent_spacing_ms: 500,
            max_concurrent_agents: 4,
            evolve_state: true,
            density_step: 0.15,
            scale_shift_per_sec: 0.0009,
            key_change_per_sec: 0.00045,
            key_change_notice_sec: 30.0,
            phase_schedule: vec![
                PhaseCue {
                    at_sec: 90.0,
                    phase: Phase::Flowering,
                },
                PhaseCue {
                    at_sec: 360.0,
                    phase: Phase::Climax,
                },
                PhaseCue {
                    at_sec: 540.0,
                    phase: Phase::Dissolving,
                },
            ],
        }
    }
}

/// Holds the composition state, gates agent triggers, and queues broadcasts.
///
/// All mutation goes through `&self`; the conductor lives behind an `Rc`
/// shared by the driver and every agent on one logical thread.
#[derive(Debug)]
pub struct Conductor {
    clock: Rc<dyn Clock>,
    params: ConductorParams,
    state: Cell<ConductorState>,
    governor: Cell<TriggerGovernor>,
    playing_agents: Cell<usize>,
    outbox: RefCell<Vec<BroadcastEvent>>,
    phase_queue: RefCell<VecDeque<PhaseCue>>,
    announced_density: Cell<f32>,
    started_at: Cell<Option<Millis>>,
    rng: RefCell<Randomness>,
}

impl Conductor {
    pub fn new(clock: Rc<dyn Clock>, params: ConductorParams, rng: Randomness) -> Self {
        let mut schedule = params.phase_schedule.clone();
        schedule.sort_by(|a, b| {
            a.at_sec
                .partial_cmp(&b.at_sec)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let state = ConductorState::default();
        Self {
            clock,
            governor: Cell::new(TriggerGovernor::new(params.min_agent_spacing_ms)),
            params,
            announced_density: Cell::new(state.density),
            state: Cell::new(state),
            playing_agents: Cell::new(0),
            outbox: RefCell::new(Vec::new()),
            phase_queue: RefCell::new(schedule.into()),
            started_at: Cell::new(None),
            rng: RefCell::new(rng),
        }
    }

    pub fn params(&self) -> &ConductorParams {
        &self.params
    }

    /// Read-only snapshot of the shared state.
    pub fn state(&self) -> ConductorState {
        self.state.get()
    }

    pub fn governor(&self) -> TriggerGovernor {
        self.governor.get()
    }

    pub fn is_started(&self) -> bool {
        self.started_at.get().is_some()
    }

    /// True when the spacing window has passed and the playing cap has room.
    pub fn can_agent_trigger(&self) -> bool {
        let now = self.clock.now_ms();
        self.governor.get().permits(now)
            && self.playing_agents.get() < self.params.max_concurrent_agents
    }

    pub fn mark_agent_trigger(&self) {
        let mut g = self.governor.get();
        g.commit(self.clock.now_ms());
        self.governor.set(g);
    }

    /// Check the spacing window and commit in one step.
    pub fn try_commit_trigger(&self) -> bool {
        let mut g = self.governor.get();
        let ok = g.try_commit(self.clock.now_ms());
        self.governor.set(g);
        ok
    }

    /// Driver-reported count of agents with audible output.
    pub fn report_playing(&self, count: usize) {
        self.playing_agents.set(count);
    }

    pub fn playing_agents(&self) -> usize {
        self.playing_agents.get()
    }

    pub fn broadcast(&self, event: BroadcastEvent) {
        debug!(target: "drift::conductor", %event, "broadcast");
        self.outbox.borrow_mut().push(event);
    }

    pub fn drain_broadcasts(&self) -> Vec<BroadcastEvent> {
        std::mem::take(&mut *self.outbox.borrow_mut())
    }

    pub fn pending_broadcasts(&self) -> usize {
        self.outbox.borrow().len()
    }

    fn update_state(&self, f: impl FnOnce(&mut ConductorState)) {
        let mut s = self.state.get();
        f(&mut s);
        s.mood = s.mood.clamp(0.0, 1.0);
        s.tension = s.tension.clamp(0.0, 1.0);
        s.density = s.density.clamp(0.0, 1.0);
        s.harmonic_center = s.harmonic_center.clamp(MIN_ROOT, MAX_ROOT);
        self.state.set(s);
    }

    pub fn set_mood(&self, mood: f32) {
        self.update_state(|s| s.mood = finite_or(mood, s.mood));
    }

    pub fn set_tension(&self, tension: f32) {
        self.update_state(|s| s.tension = finite_or(tension, s.tension));
    }

    pub fn set_density(&self, density: f32) {
        self.update_state(|s| s.density = finite_or(density, s.density));
    }

    pub fn set_scale(&self, scale: Scale) {
        self.update_state(|s| s.scale = scale);
    }

    pub fn set_harmonic_center(&self, root: u8) {
        self.update_state(|s| s.harmonic_center = root);
    }

    /// Move to `phase`, announcing it if it differs from the current one.
    pub fn set_phase(&self, phase: Phase) {
        if self.state.get().phase == phase {
            return;
        }
        self.update_state(|s| s.phase = phase);
        self.announce_phase(phase);
    }

    fn announce_phase(&self, phase: Phase) {
        info!(target: "drift::conductor", %phase, "phase change");
        self.broadcast(BroadcastEvent::PhaseChange { phase });
        match phase {
            Phase::Climax => self.broadcast(BroadcastEvent::ClimaxBuilding),
            Phase::Dissolving => self.broadcast(BroadcastEvent::Dissolving),
            Phase::Genesis | Phase::Flowering => {}
        }
    }

    pub fn randomize_initial_state(&self) {
        let mut rng = self.rng.borrow_mut();
        let root = rng.choice(&STARTING_ROOTS).copied().unwrap_or(48);
        let scale = rng
            .choice(&STARTING_SCALES)
            .copied()
            .unwrap_or(Scale::Dorian);
        let mood = 0.4 + rng.range(0.0, 0.3);
        drop(rng);
        self.update_state(|s| {
            s.harmonic_center = root;
            s.scale = scale;
            s.mood = mood;
        });
        self.announced_density.set(self.state.get().density);
        info!(
            target: "drift::conductor",
            key = %midi_to_name(root),
            %scale,
            mood,
            "initial state"
        );
    }

    /// Begin the performance clock and announce the opening phase.
    pub fn start(&self) {
        if self.is_started() {
            return;
        }
        self.started_at.set(Some(self.clock.now_ms()));
        self.update_state(|s| {
            s.elapsed_sec = 0.0;
            s.phase = Phase::Genesis;
        });
        self.announce_phase(Phase::Genesis);
    }

    /// Advance composition state by `delta_sec` of performance time.
    pub fn evolve(&self, delta_sec: f32) {
        let Some(started) = self.started_at.get() else {
            return;
        };
        let elapsed = ms_to_sec(self.clock.now_ms().saturating_sub(started));
        self.update_state(|s| s.elapsed_sec = elapsed);
        self.dispatch_phases_until(elapsed);

        if !self.params.evolve_state {
            return;
        }

        let delta_sec = if delta_sec.is_finite() {
            delta_sec.max(0.0)
        } else {
            0.0
        };
        let (mood, density, tension, shift_scale, change_key) = {
            let mut rng = self.rng.borrow_mut();
            let mood_n = rng.fbm(elapsed * 0.006, 0.0, 3, 0.5);
            let density_n = rng.fbm(elapsed * 0.004 + 50.0, 0.0, 3, 0.5);
            let tension_n = rng.fbm(elapsed * 0.005 + 100.0, 0.0, 2, 0.5);
            (
                (0.5 + mood_n * 0.4).clamp(0.15, 0.85),
                (0.5 + density_n * 0.3).clamp(0.25, 0.75),
                (0.35 + tension_n * 0.3).clamp(0.15, 0.7),
                rng.chance(self.params.scale_shift_per_sec * delta_sec),
                rng.chance(self.params.key_change_per_sec * delta_sec),
            )
        };
        self.update_state(|s| {
            s.mood = mood;
            s.density = density;
            s.tension = tension;
        });

        if (density - self.announced_density.get()).abs() >= self.params.density_step {
            self.announced_density.set(density);
            self.broadcast(BroadcastEvent::DensityChange { density });
        }

        if shift_scale {
            let scale = Scale::for_mood(mood, &mut self.rng.borrow_mut());
            self.set_scale(scale);
            info!(target: "drift::conductor", %scale, "scale shift");
        }

        if change_key {
            self.change_key();
        }
    }

    fn dispatch_phases_until(&self, elapsed_sec: f32) {
        loop {
            let cue = {
                let mut queue = self.phase_queue.borrow_mut();
                match queue.front() {
                    Some(cue) if cue.at_sec <= elapsed_sec => queue.pop_front(),
                    _ => None,
                }
            };
            let Some(cue) = cue else { break };
            if cue.phase > self.state.get().phase {
                self.set_phase(cue.phase);
            }
        }
    }

    /// Move the key by a fourth, fifth or step and warn the agents.
    pub fn change_key(&self) {
        let current = self.state.get().harmonic_center;
        let step = self
            .rng
            .borrow_mut()
            .choice(&KEY_STEPS)
            .copied()
            .unwrap_or(5);
        let new_root = (current as i16 + step).clamp(MIN_ROOT as i16, MAX_ROOT as i16) as u8;
        self.set_harmonic_center(new_root);
        info!(
            target: "drift::conductor",
            from = %midi_to_name(current),
            to = %midi_to_name(new_root),
            "key change"
        );
        self.broadcast(BroadcastEvent::KeyChangePending {
            new_root,
            in_seconds: self.params.key_change_notice_sec,
        });
    }
}

fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() { v } else { fallback }
}
