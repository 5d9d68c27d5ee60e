use std::any::Any;

use tracing::debug;

use super::behavior::{AgentCtx, AgentKind, Behavior, Cue, Gate};
use super::synth::{OUTPUT, SynthCommand, VoiceId};
use crate::core::timebase::sec_to_ms;

const VOICES: &[VoiceId] = &["crackle", "heartbeat", "cymbal", OUTPUT];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layer {
    Crackle,
    Heartbeat,
    Cymbal,
}

/// Long environmental layers: vinyl crackle, a heartbeat train, cymbal swells.
///
/// Layers run independently. Picking a crackle or heartbeat that is already
/// running does nothing; cymbal swells may overlap.
#[derive(Debug, Default)]
pub struct Atmosphere {
    last_pick: Option<Layer>,
    crackle_running: bool,
    cymbals_in_flight: u32,
    beats_left: u32,
    beat_interval_ms: u64,
    beat_velocity: f32,
}

impl Atmosphere {
    /// The most recently picked layer, while it is still running.
    pub fn layer(&self) -> Option<Layer> {
        self.last_pick.filter(|l| self.is_running(*l))
    }

    pub fn is_running(&self, layer: Layer) -> bool {
        match layer {
            Layer::Crackle => self.crackle_running,
            Layer::Heartbeat => self.beats_left > 0,
            Layer::Cymbal => self.cymbals_in_flight > 0,
        }
    }

    pub fn beats_left(&self) -> u32 {
        self.beats_left
    }

    fn any_running(&self) -> bool {
        self.crackle_running || self.beats_left > 0 || self.cymbals_in_flight > 0
    }

    fn pick_layer(ctx: &mut AgentCtx<'_>) -> Layer {
        let s = ctx.state;
        if s.mood < 0.3 && s.tension > 0.4 {
            Layer::Heartbeat
        } else if s.mood < 0.4 {
            Layer::Crackle
        } else if s.tension > 0.6 {
            Layer::Cymbal
        } else {
            ctx.rng
                .weighted_choice(&[
                    (Layer::Crackle, 0.4),
                    (Layer::Heartbeat, 0.3),
                    (Layer::Cymbal, 0.3),
                ])
                .unwrap_or(Layer::Crackle)
        }
    }

    fn settle(&mut self, ctx: &mut AgentCtx<'_>) {
        if !self.any_running() {
            *ctx.playing = false;
        }
    }

    fn beat(&mut self, ctx: &mut AgentCtx<'_>) {
        if self.beats_left == 0 {
            self.settle(ctx);
            return;
        }
        ctx.send(
            "heartbeat",
            SynthCommand::Beat {
                velocity: self.beat_velocity,
            },
        );
        self.beats_left -= 1;
        if self.beats_left == 0 {
            self.settle(ctx);
        } else {
            ctx.after(self.beat_interval_ms, Cue::Beat);
        }
    }
}

impl Behavior for Atmosphere {
    fn kind(&self) -> AgentKind {
        AgentKind::Atmosphere
    }

    fn voices(&self) -> &'static [VoiceId] {
        VOICES
    }

    fn should_play(&mut self, gate: &mut Gate<'_>) -> bool {
        if !gate.enabled() || gate.state.density > 0.7 {
            return false;
        }
        gate.shared()
    }

    fn on_fire(&mut self, ctx: &mut AgentCtx<'_>) {
        let layer = Self::pick_layer(ctx);
        let tension = ctx.state.tension;
        self.last_pick = Some(layer);
        match layer {
            Layer::Crackle if self.crackle_running => {
                debug!(target: "drift::agent", agent = ctx.agent, "crackle already running");
            }
            Layer::Crackle => {
                let length_sec = 15.0 + ctx.rng.range(0.0, 25.0);
                self.crackle_running = true;
                ctx.send("crackle", SynthCommand::Start);
                ctx.after(sec_to_ms(length_sec), Cue::CrackleEnd);
                debug!(target: "drift::agent", agent = ctx.agent, length_sec, "crackle");
            }
            Layer::Heartbeat if self.beats_left > 0 => {
                debug!(target: "drift::agent", agent = ctx.agent, "heartbeat already running");
            }
            Layer::Heartbeat => {
                let bpm = 60.0 + tension * 20.0;
                let interval_ms = 60_000.0 / bpm;
                let length_sec = 20.0 + ctx.rng.range(0.0, 20.0);
                self.beats_left = (length_sec * 1000.0 / interval_ms).floor() as u32;
                self.beat_interval_ms = interval_ms as u64;
                self.beat_velocity = 0.4 + tension * 0.2;
                debug!(
                    target: "drift::agent",
                    agent = ctx.agent,
                    bpm,
                    beats = self.beats_left,
                    "heartbeat"
                );
                self.beat(ctx);
            }
            Layer::Cymbal => {
                let duration_sec = 4.0 + ctx.rng.range(0.0, 4.0);
                let volume = 0.15 + tension * 0.15;
                self.cymbals_in_flight += 1;
                ctx.send(
                    "cymbal",
                    SynthCommand::Swell {
                        duration_sec,
                        volume,
                    },
                );
                ctx.after(sec_to_ms(duration_sec), Cue::CymbalEnd);
                debug!(target: "drift::agent", agent = ctx.agent, duration_sec, volume, "cymbal swell");
            }
        }
        self.settle(ctx);
    }

    fn on_cue(&mut self, cue: Cue, ctx: &mut AgentCtx<'_>) {
        match cue {
            Cue::Beat => self.beat(ctx),
            Cue::CrackleEnd if self.crackle_running => {
                ctx.send("crackle", SynthCommand::Stop { fade_sec: 2.0 });
                self.crackle_running = false;
                self.settle(ctx);
            }
            Cue::CymbalEnd if self.cymbals_in_flight > 0 => {
                self.cymbals_in_flight -= 1;
                self.settle(ctx);
            }
            _ => {}
        }
    }

    fn on_stop(&mut self, ctx: &mut AgentCtx<'_>) {
        if self.crackle_running {
            ctx.send("crackle", SynthCommand::Stop { fade_sec: 0.5 });
            self.crackle_running = false;
        }
        if self.cymbals_in_flight > 0 {
            ctx.send("cymbal", SynthCommand::Stop { fade_sec: 0.5 });
            self.cymbals_in_flight = 0;
        }
        self.beats_left = 0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
