use std::any::Any;

use serde::{Deserialize, Serialize};

use super::activity::ActivityMonitor;
use super::agent::AgentTiming;
use super::atmosphere::Atmosphere;
use super::conductor::{Conductor, ConductorState};
use super::event::BroadcastEvent;
use super::granular::Granular;
use super::synth::{Synth, SynthCommand, VoiceId};
use super::tasks::{TaskHandle, TaskQueue};
use super::texture::Texture;
use crate::core::music::scale_notes;
use crate::core::random::Randomness;
use crate::core::timebase::Millis;

/// Ceiling of the per-agent fire probability ramp.
pub const MAX_FIRE_CHANCE: f32 = 0.5;

/// Probability of firing after `elapsed_ms` since the last trigger.
///
/// Zero below `min_ms`, rising linearly to [`MAX_FIRE_CHANCE`] at or beyond
/// `max_ms`. A degenerate window (`min_ms == max_ms`) jumps straight to the
/// ceiling once `min_ms` is reached.
pub fn fire_chance(elapsed_ms: Millis, min_ms: Millis, max_ms: Millis) -> f32 {
    if elapsed_ms < min_ms {
        return 0.0;
    }
    if max_ms <= min_ms {
        return MAX_FIRE_CHANCE;
    }
    let ramp = (elapsed_ms - min_ms) as f64 / (max_ms - min_ms) as f64;
    (ramp as f32).clamp(0.0, MAX_FIRE_CHANCE)
}

/// Scheduled sub-event payloads, interpreted by the owning behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cue {
    Grain,
    CloudEnd,
    BreathEnd,
    SwellRelease { release_ms: Millis },
    SwellEnd,
    CrackleEnd,
    Beat,
    CymbalEnd,
}

/// Parameter changes a behavior requests while handling a broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Tuning {
    pub enabled: Option<bool>,
    pub min_interval_ms: Option<Millis>,
    pub max_interval_ms: Option<Millis>,
}

/// Inputs to one `should_play` evaluation.
pub struct Gate<'a> {
    pub now: Millis,
    pub state: ConductorState,
    pub activity: &'a ActivityMonitor,
    pub rng: &'a mut Randomness,
    pub(crate) conductor: &'a Conductor,
    pub(crate) enabled: bool,
    pub(crate) last_play_time: Millis,
    pub(crate) min_interval_ms: Millis,
    pub(crate) max_interval_ms: Millis,
}

impl Gate<'_> {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn elapsed_ms(&self) -> Millis {
        self.now.saturating_sub(self.last_play_time)
    }

    pub fn fire_chance(&self) -> f32 {
        fire_chance(self.elapsed_ms(), self.min_interval_ms, self.max_interval_ms)
    }

    /// The shared gate: enabled, governor, interval floor, then a draw
    /// against the ramp.
    pub fn shared(&mut self) -> bool {
        self.shared_with(|chance, rng, _| rng.chance(chance))
    }

    /// The shared gate with the final draw replaced by `draw`, which receives
    /// the ramp probability.
    pub fn shared_with(
        &mut self,
        draw: impl FnOnce(f32, &mut Randomness, &ConductorState) -> bool,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.conductor.can_agent_trigger() {
            return false;
        }
        if self.elapsed_ms() < self.min_interval_ms {
            return false;
        }
        let chance = self.fire_chance();
        draw(chance, &mut *self.rng, &self.state)
    }
}

/// Everything a behavior may touch while firing, running a cue, or stopping.
pub struct AgentCtx<'a> {
    pub agent: &'a str,
    pub now: Millis,
    pub state: ConductorState,
    pub activity: &'a ActivityMonitor,
    pub rng: &'a mut Randomness,
    pub synth: &'a mut dyn Synth,
    pub tasks: &'a mut TaskQueue<Cue>,
    pub playing: &'a mut bool,
}

impl AgentCtx<'_> {
    pub fn after(&mut self, delay_ms: Millis, cue: Cue) -> TaskHandle {
        self.tasks.schedule(self.now.saturating_add(delay_ms), cue)
    }

    pub fn send(&mut self, voice: VoiceId, cmd: SynthCommand) {
        self.synth.send(voice, cmd);
    }

    pub fn scale_notes(&self, octaves: u8) -> Vec<u8> {
        scale_notes(self.state.harmonic_center, self.state.scale, octaves)
    }
}

/// Variant-specific policy injected into an [`Agent`](super::agent::Agent).
pub trait Behavior: std::fmt::Debug {
    fn kind(&self) -> AgentKind;

    /// Voices the synthesis graph must provide.
    fn voices(&self) -> &'static [VoiceId];

    /// Variant gate. Defaults to the shared gate alone.
    fn should_play(&mut self, gate: &mut Gate<'_>) -> bool {
        gate.shared()
    }

    /// Start sound production after a committed trigger.
    fn on_fire(&mut self, ctx: &mut AgentCtx<'_>);

    fn on_cue(&mut self, cue: Cue, ctx: &mut AgentCtx<'_>);

    fn on_tick(&mut self, _delta_ms: f32, _ctx: &mut AgentCtx<'_>) {}

    /// Silence output. Outstanding cues are already cancelled.
    fn on_stop(&mut self, ctx: &mut AgentCtx<'_>);

    fn on_event(&mut self, _event: &BroadcastEvent, _tuning: &mut Tuning) {}

    fn as_any(&self) -> &dyn Any;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Granular,
    Texture,
    Atmosphere,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [
        AgentKind::Granular,
        AgentKind::Texture,
        AgentKind::Atmosphere,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Granular => "Granular",
            AgentKind::Texture => "Texture",
            AgentKind::Atmosphere => "Atmosphere",
        }
    }

    /// Lowercase key used in configuration sections.
    pub fn key(&self) -> &'static str {
        match self {
            AgentKind::Granular => "granular",
            AgentKind::Texture => "texture",
            AgentKind::Atmosphere => "atmosphere",
        }
    }

    pub fn default_timing(&self) -> AgentTiming {
        let (min_interval_ms, max_interval_ms, volume) = match self {
            AgentKind::Granular => (40_000, 100_000, 0.2),
            AgentKind::Texture => (10_000, 45_000, 0.25),
            AgentKind::Atmosphere => (60_000, 180_000, 0.25),
        };
        AgentTiming {
            enabled: true,
            min_interval_ms,
            max_interval_ms,
            volume,
        }
    }

    pub fn behavior(&self) -> Box<dyn Behavior> {
        match self {
            AgentKind::Granular => Box::new(Granular::default()),
            AgentKind::Texture => Box::new(Texture::default()),
            AgentKind::Atmosphere => Box::new(Atmosphere::default()),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_is_zero_at_floor_and_capped() {
        assert_eq!(fire_chance(4_999, 5_000, 30_000), 0.0);
        assert_eq!(fire_chance(5_000, 5_000, 30_000), 0.0);
        assert!((fire_chance(17_500, 5_000, 30_000) - 0.5).abs() < 1e-6);
        assert_eq!(fire_chance(30_000, 5_000, 30_000), 0.5);
        assert_eq!(fire_chance(u64::MAX, 5_000, 30_000), 0.5);
    }

    #[test]
    fn ramp_is_monotone() {
        let mut prev = 0.0;
        for elapsed in (0..60_000).step_by(250) {
            let c = fire_chance(elapsed, 5_000, 30_000);
            assert!(c >= prev, "ramp fell at {elapsed}");
            assert!(c <= MAX_FIRE_CHANCE);
            prev = c;
        }
    }

    #[test]
    fn degenerate_window_jumps_to_ceiling() {
        assert_eq!(fire_chance(999, 1_000, 1_000), 0.0);
        assert_eq!(fire_chance(1_000, 1_000, 1_000), 0.5);
    }

    #[test]
    fn default_timings_are_ordered() {
        for kind in AgentKind::ALL {
            let t = kind.default_timing();
            assert!(t.min_interval_ms <= t.max_interval_ms, "{kind}");
            assert_eq!(kind.behavior().kind(), kind);
        }
    }
}
