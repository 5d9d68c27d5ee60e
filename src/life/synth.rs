//! Narrow interface to the external synthesis collaborator.
//!
//! Agents never render audio themselves; they issue fire-and-forget commands to
//! named voices of a [`Synth`]. [`RecordingSynth`] keeps those commands in a
//! shared [`SynthLog`] for the headless renderer and for tests.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;
use tracing::{trace, warn};

use crate::core::timebase::{Clock, Millis};

/// Name of one node in an agent's synthesis graph.
pub type VoiceId = &'static str;

/// Every agent graph ends in this gain stage.
pub const OUTPUT: VoiceId = "output";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum SynthCommand {
    Note {
        freq_hz: f32,
        velocity: f32,
        duration_sec: f32,
    },
    /// Ramp the voice gain to `target` over `time_sec`.
    Ramp { target: f32, time_sec: f32 },
    Start,
    /// Stop the voice, letting the collaborator fade over `fade_sec`.
    Stop { fade_sec: f32 },
    Intensity { value: f32 },
    Beat { velocity: f32 },
    Swell { duration_sec: f32, volume: f32 },
    Param { name: &'static str, value: f32 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SynthError {
    #[error("synth for `{0}` was already disposed")]
    Disposed(String),
    #[error("synth for `{agent}` has no voice `{voice}`")]
    UnknownVoice { agent: String, voice: String },
}

pub trait Synth: std::fmt::Debug {
    /// Build and wire the voices the agent needs.
    fn init(&mut self, voices: &[VoiceId]) -> Result<(), SynthError>;
    fn send(&mut self, voice: VoiceId, cmd: SynthCommand);
    /// Release every resource held; called once per agent.
    fn dispose(&mut self);
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SynthEvent {
    Init { voices: Vec<VoiceId> },
    Command { voice: VoiceId, command: SynthCommand },
    Dispose,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SynthRecord {
    pub at_ms: Millis,
    pub agent: String,
    #[serde(flatten)]
    pub event: SynthEvent,
}

/// Shared, append-only record of everything sent to recording synths.
#[derive(Clone, Debug, Default)]
pub struct SynthLog {
    records: Rc<RefCell<Vec<SynthRecord>>>,
}

impl SynthLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: SynthRecord) {
        self.records.borrow_mut().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    pub fn snapshot(&self) -> Vec<SynthRecord> {
        self.records.borrow().clone()
    }

    pub fn commands_for(&self, agent: &str) -> Vec<(VoiceId, SynthCommand)> {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.agent == agent)
            .filter_map(|r| match &r.event {
                SynthEvent::Command { voice, command } => Some((*voice, command.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn count_where(&self, agent: &str, pred: impl Fn(&SynthEvent) -> bool) -> usize {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.agent == agent && pred(&r.event))
            .count()
    }

    /// Write one JSON object per record.
    pub fn write_json_lines<W: std::io::Write>(&self, mut out: W) -> std::io::Result<()> {
        for record in self.records.borrow().iter() {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct RecordingSynth {
    agent: String,
    clock: Rc<dyn Clock>,
    log: SynthLog,
    voices: Vec<VoiceId>,
    disposed: bool,
}

impl RecordingSynth {
    pub fn new(agent: impl Into<String>, clock: Rc<dyn Clock>, log: SynthLog) -> Self {
        Self {
            agent: agent.into(),
            clock,
            log,
            voices: Vec::new(),
            disposed: false,
        }
    }

    fn record(&self, event: SynthEvent) {
        self.log.push(SynthRecord {
            at_ms: self.clock.now_ms(),
            agent: self.agent.clone(),
            event,
        });
    }
}

impl Synth for RecordingSynth {
    fn init(&mut self, voices: &[VoiceId]) -> Result<(), SynthError> {
        if self.disposed {
            return Err(SynthError::Disposed(self.agent.clone()));
        }
        self.voices = voices.to_vec();
        self.record(SynthEvent::Init {
            voices: self.voices.clone(),
        });
        Ok(())
    }

    fn send(&mut self, voice: VoiceId, cmd: SynthCommand) {
        if self.disposed {
            warn!(target: "drift::synth", agent = %self.agent, voice, "command after dispose dropped");
            return;
        }
        if !self.voices.contains(&voice) {
            let err = SynthError::UnknownVoice {
                agent: self.agent.clone(),
                voice: voice.to_string(),
            };
            warn!(target: "drift::synth", error = %err, "command dropped");
            return;
        }
        trace!(target: "drift::synth", agent = %self.agent, voice, ?cmd);
        self.record(SynthEvent::Command {
            voice,
            command: cmd,
        });
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.voices.clear();
        self.record(SynthEvent::Dispose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timebase::ManualClock;

    #[test]
    fn records_known_voices_only() {
        let clock = ManualClock::new(42);
        let log = SynthLog::new();
        let mut synth = RecordingSynth::new("Texture", Rc::new(clock), log.clone());
        synth.init(&["breath", OUTPUT]).expect("init");
        synth.send("breath", SynthCommand::Start);
        synth.send("nowhere", SynthCommand::Start);
        assert_eq!(log.commands_for("Texture"), vec![("breath", SynthCommand::Start)]);
        assert_eq!(log.snapshot()[1].at_ms, 42);
    }

    #[test]
    fn dispose_is_recorded_once_and_blocks_reinit() {
        let log = SynthLog::new();
        let mut synth = RecordingSynth::new("Granular", Rc::new(ManualClock::new(0)), log.clone());
        synth.init(&[OUTPUT]).expect("init");
        synth.dispose();
        synth.dispose();
        assert_eq!(
            log.count_where("Granular", |e| matches!(e, SynthEvent::Dispose)),
            1
        );
        assert!(synth.init(&[OUTPUT]).is_err());
    }

    #[test]
    fn json_lines_are_flat_objects() {
        let log = SynthLog::new();
        let mut synth = RecordingSynth::new("Atmosphere", Rc::new(ManualClock::new(7)), log.clone());
        synth.init(&["heartbeat"]).expect("init");
        synth.send("heartbeat", SynthCommand::Beat { velocity: 0.5 });
        let mut buf = Vec::new();
        log.write_json_lines(&mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(v["agent"], "Atmosphere");
        assert_eq!(v["event"], "command");
        assert_eq!(v["voice"], "heartbeat");
        assert_eq!(v["command"]["cmd"], "beat");
    }
}
