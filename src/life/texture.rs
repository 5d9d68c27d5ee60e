use std::any::Any;

use tracing::debug;

use super::behavior::{AgentCtx, AgentKind, Behavior, Cue, Gate, Tuning};
use super::event::{BroadcastEvent, Phase};
use super::synth::{OUTPUT, SynthCommand, VoiceId};
use super::tasks::TaskHandle;
use crate::core::timebase::sec_to_ms;

const VOICES: &[VoiceId] = &["breath", "noise", OUTPUT];

/// Silence, in seconds, after which texture fills the room unconditionally.
pub const FILL_SILENCE_SEC: f32 = 8.0;
const BREATH_CHANCE: f32 = 0.6;
const NOISE_FADE_SEC: f32 = 2.0;
const INTENSITY_EPSILON: f32 = 0.005;

/// Breath drones and noise swells that keep the room from going silent.
///
/// Swells share one noise voice. A new swell takes over the envelope of a
/// running one, and only the newest swell's release and end cues stay queued.
#[derive(Debug, Default)]
pub struct Texture {
    breath_running: bool,
    swell_running: bool,
    swell_cue: Option<TaskHandle>,
    last_intensity: f32,
}

fn breath_intensity(density: f32) -> f32 {
    0.3 + density * 0.4
}

impl Texture {
    pub fn breath_running(&self) -> bool {
        self.breath_running
    }

    pub fn swell_running(&self) -> bool {
        self.swell_running
    }

    fn start_breath(&mut self, ctx: &mut AgentCtx<'_>) {
        let intensity = breath_intensity(ctx.state.density);
        let length_sec = ctx.rng.range(15.0, 30.0);
        ctx.send("breath", SynthCommand::Start);
        ctx.send("breath", SynthCommand::Intensity { value: intensity });
        ctx.after(sec_to_ms(length_sec), Cue::BreathEnd);
        self.breath_running = true;
        self.last_intensity = intensity;
        debug!(target: "drift::agent", agent = ctx.agent, intensity, length_sec, "breath");
    }

    fn start_swell(&mut self, ctx: &mut AgentCtx<'_>) {
        let peak = 0.1 + ctx.state.tension * 0.15;
        let attack_sec = ctx.rng.range(5.0, 15.0);
        let hold_sec = ctx.rng.range(2.0, 8.0);
        let release_sec = ctx.rng.range(5.0, 15.0);
        if let Some(stale) = self.swell_cue.take() {
            ctx.tasks.cancel(stale);
        }
        if !self.swell_running {
            ctx.send("noise", SynthCommand::Start);
        }
        ctx.send(
            "noise",
            SynthCommand::Ramp {
                target: peak,
                time_sec: attack_sec,
            },
        );
        let cue = ctx.after(
            sec_to_ms(attack_sec + hold_sec),
            Cue::SwellRelease {
                release_ms: sec_to_ms(release_sec),
            },
        );
        self.swell_cue = Some(cue);
        self.swell_running = true;
        debug!(
            target: "drift::agent",
            agent = ctx.agent,
            peak,
            attack_sec,
            hold_sec,
            release_sec,
            "noise swell"
        );
    }
}

impl Behavior for Texture {
    fn kind(&self) -> AgentKind {
        AgentKind::Texture
    }

    fn voices(&self) -> &'static [VoiceId] {
        VOICES
    }

    fn should_play(&mut self, gate: &mut Gate<'_>) -> bool {
        if !gate.enabled() {
            return false;
        }
        if gate.activity.needs_activity(FILL_SILENCE_SEC) {
            return true;
        }
        let density = gate.state.density;
        gate.shared() || gate.rng.chance(density * 0.3 * 0.1)
    }

    fn on_fire(&mut self, ctx: &mut AgentCtx<'_>) {
        if !self.breath_running && ctx.rng.chance(BREATH_CHANCE) {
            self.start_breath(ctx);
        } else {
            self.start_swell(ctx);
        }
    }

    fn on_cue(&mut self, cue: Cue, ctx: &mut AgentCtx<'_>) {
        match cue {
            Cue::BreathEnd => {
                ctx.send("breath", SynthCommand::Stop { fade_sec: NOISE_FADE_SEC });
                self.breath_running = false;
                if !self.swell_running {
                    *ctx.playing = false;
                }
            }
            Cue::SwellRelease { release_ms } => {
                ctx.send(
                    "noise",
                    SynthCommand::Ramp {
                        target: 0.0,
                        time_sec: release_ms as f32 / 1000.0,
                    },
                );
                self.swell_cue = Some(ctx.after(release_ms, Cue::SwellEnd));
            }
            Cue::SwellEnd => {
                // Gain is already at zero; release the source.
                ctx.send("noise", SynthCommand::Stop { fade_sec: 0.0 });
                self.swell_cue = None;
                self.swell_running = false;
                if !self.breath_running {
                    *ctx.playing = false;
                }
            }
            _ => {}
        }
    }

    fn on_tick(&mut self, _delta_ms: f32, ctx: &mut AgentCtx<'_>) {
        if !self.breath_running {
            return;
        }
        let intensity = breath_intensity(ctx.state.density);
        if (intensity - self.last_intensity).abs() > INTENSITY_EPSILON {
            ctx.send("breath", SynthCommand::Intensity { value: intensity });
            self.last_intensity = intensity;
        }
    }

    fn on_stop(&mut self, ctx: &mut AgentCtx<'_>) {
        if self.swell_running {
            ctx.send("noise", SynthCommand::Stop { fade_sec: NOISE_FADE_SEC });
            self.swell_running = false;
        }
        self.swell_cue = None;
        if self.breath_running {
            ctx.send("breath", SynthCommand::Stop { fade_sec: 0.0 });
            self.breath_running = false;
        }
    }

    fn on_event(&mut self, event: &BroadcastEvent, tuning: &mut Tuning) {
        match event {
            BroadcastEvent::PhaseChange { phase } => match phase {
                Phase::Genesis => {
                    tuning.enabled = Some(true);
                    tuning.min_interval_ms = Some(5_000);
                }
                Phase::Flowering => tuning.min_interval_ms = Some(15_000),
                Phase::Climax | Phase::Dissolving => {}
            },
            BroadcastEvent::Dissolving => tuning.min_interval_ms = Some(20_000),
            BroadcastEvent::KeyChangePending { .. }
            | BroadcastEvent::DensityChange { .. }
            | BroadcastEvent::ClimaxBuilding => {}
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
