use std::any::Any;

use tracing::debug;

use super::behavior::{AgentCtx, AgentKind, Behavior, Cue, Gate};
use super::synth::{OUTPUT, SynthCommand, VoiceId};
use crate::core::music::midi_to_freq;
use crate::core::timebase::sec_to_ms;

const VOICES: &[VoiceId] = &["grain", "crusher", "tremolo", OUTPUT];

/// Sparse clouds of short bit-crushed grains.
#[derive(Debug, Default)]
pub struct Granular {
    cloud_playing: bool,
    /// Two-octave note list captured when the cloud fired.
    notes: Vec<u8>,
}

impl Granular {
    pub fn cloud_playing(&self) -> bool {
        self.cloud_playing
    }

    fn grain(&mut self, ctx: &mut AgentCtx<'_>) {
        if self.notes.is_empty() {
            return;
        }
        let mid = (self.notes.len() / 2) as i64;
        let offset = (ctx.rng.gaussian(0.0, 1.0) * 3.0).floor() as i64;
        let idx = (mid + offset).clamp(0, self.notes.len() as i64 - 1) as usize;
        let duration_sec = 0.05 + ctx.rng.range(0.0, 0.15);
        let velocity = 0.2 + ctx.rng.range(0.0, 0.3);
        ctx.send(
            "grain",
            SynthCommand::Note {
                freq_hz: midi_to_freq(self.notes[idx] as f32),
                velocity,
                duration_sec,
            },
        );
    }
}

impl Behavior for Granular {
    fn kind(&self) -> AgentKind {
        AgentKind::Granular
    }

    fn voices(&self) -> &'static [VoiceId] {
        VOICES
    }

    fn should_play(&mut self, gate: &mut Gate<'_>) -> bool {
        if !gate.enabled() || self.cloud_playing {
            return false;
        }
        // Bright and relaxed passages stay clean.
        if gate.state.mood > 0.6 && gate.state.tension < 0.4 {
            return false;
        }
        if !gate.activity.has_room(0.45) {
            return false;
        }
        gate.shared()
    }

    fn on_fire(&mut self, ctx: &mut AgentCtx<'_>) {
        let bit_depth = (6.0 + ctx.state.mood * 6.0).floor();
        let tremolo_hz = 8.0 + ctx.state.tension * 20.0;
        ctx.send(
            "crusher",
            SynthCommand::Param {
                name: "bit_depth",
                value: bit_depth,
            },
        );
        ctx.send(
            "tremolo",
            SynthCommand::Param {
                name: "rate_hz",
                value: tremolo_hz,
            },
        );

        let grains = 8 + ctx.rng.range_int(0, 11) as usize;
        let duration_sec = 4.0 + ctx.rng.range(0.0, 6.0);
        let spacing_ms = duration_sec * 1000.0 / grains as f32;
        self.notes = ctx.scale_notes(2);
        for i in 0..grains {
            let jitter = ctx.rng.range(-0.3 * spacing_ms, 0.3 * spacing_ms);
            let delay = (i as f32 * spacing_ms + jitter).max(0.0);
            ctx.after(delay as u64, Cue::Grain);
        }
        ctx.after(sec_to_ms(duration_sec) + 500, Cue::CloudEnd);
        self.cloud_playing = true;
        debug!(
            target: "drift::agent",
            agent = ctx.agent,
            grains,
            duration_sec,
            bit_depth,
            "grain cloud"
        );
    }

    fn on_cue(&mut self, cue: Cue, ctx: &mut AgentCtx<'_>) {
        match cue {
            Cue::Grain => self.grain(ctx),
            Cue::CloudEnd => {
                self.cloud_playing = false;
                *ctx.playing = false;
            }
            _ => {}
        }
    }

    fn on_stop(&mut self, _ctx: &mut AgentCtx<'_>) {
        self.cloud_playing = false;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
