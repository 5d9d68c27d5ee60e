use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, info, warn};

use super::activity::{ActivityMonitor, ActivityParams};
use super::agent::{Agent, AgentDeps, AgentError, AgentTiming};
use super::behavior::AgentKind;
use super::conductor::{Conductor, ConductorParams};
use super::event::BroadcastEvent;
use super::synth::Synth;
use crate::config::DriftConfig;
use crate::core::random::Randomness;
use crate::core::timebase::{Clock, Millis, ms_to_sec};

/// A direct `play()` requested a fixed time after the performance starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpeningCue {
    pub after_ms: Millis,
    pub agent: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub now_ms: Millis,
    /// Agents that committed a trigger this tick, in update order.
    pub triggered: Vec<String>,
    pub broadcasts: Vec<BroadcastEvent>,
}

/// Owns the agents of one performance and drives them from a single loop.
#[derive(Debug)]
pub struct Ensemble {
    clock: Rc<dyn Clock>,
    conductor: Rc<Conductor>,
    activity: Rc<ActivityMonitor>,
    agents: Vec<Agent>,
    openings: VecDeque<OpeningCue>,
    rng: Randomness,
    started_at: Option<Millis>,
    last_tick: Option<Millis>,
    paused: bool,
    stopped: bool,
    disposed: bool,
}

impl Ensemble {
    pub fn new(
        clock: Rc<dyn Clock>,
        conductor_params: ConductorParams,
        activity_params: ActivityParams,
        seed: u64,
    ) -> Self {
        let mut rng = Randomness::from_seed(seed);
        let conductor = Conductor::new(clock.clone(), conductor_params, rng.fork(0));
        let activity = ActivityMonitor::new(clock.clone(), activity_params);
        Self {
            clock,
            conductor: Rc::new(conductor),
            activity: Rc::new(activity),
            agents: Vec::new(),
            openings: VecDeque::new(),
            rng,
            started_at: None,
            last_tick: None,
            paused: false,
            stopped: false,
            disposed: false,
        }
    }

    /// Build the configured agents, each with a synth from `synth_for`.
    pub fn from_config(
        cfg: &DriftConfig,
        clock: Rc<dyn Clock>,
        mut synth_for: impl FnMut(&str) -> Box<dyn Synth>,
    ) -> Result<Self, AgentError> {
        let mut ensemble = Self::new(
            clock,
            cfg.conductor.params(),
            cfg.activity.params(),
            cfg.run.seed,
        );
        if cfg.conductor.randomize_initial_state {
            ensemble.conductor.randomize_initial_state();
        }
        for kind in AgentKind::ALL {
            let timing = cfg.agents.timing(kind);
            ensemble.spawn(kind, timing, synth_for(kind.name()))?;
        }
        for opening in &cfg.run.openings {
            ensemble.schedule_opening(opening.after_ms, opening.agent.name());
        }
        Ok(ensemble)
    }

    pub fn conductor(&self) -> &Rc<Conductor> {
        &self.conductor
    }

    pub fn activity(&self) -> &Rc<ActivityMonitor> {
        &self.activity
    }

    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    pub fn deps(&self) -> AgentDeps {
        AgentDeps {
            clock: self.clock.clone(),
            conductor: self.conductor.clone(),
            activity: self.activity.clone(),
        }
    }

    /// Independent random stream for a new agent.
    pub fn fork_rng(&mut self) -> Randomness {
        let salt = self.agents.len() as u64 + 1;
        self.rng.fork(salt)
    }

    pub fn add_agent(&mut self, agent: Agent) -> Result<(), AgentError> {
        if self.agents.iter().any(|a| a.name() == agent.name()) {
            return Err(AgentError::DuplicateName(agent.name().to_string()));
        }
        debug!(target: "drift::ensemble", agent = agent.name(), kind = %agent.kind(), "agent added");
        self.agents.push(agent);
        Ok(())
    }

    pub fn spawn(
        &mut self,
        kind: AgentKind,
        timing: AgentTiming,
        synth: Box<dyn Synth>,
    ) -> Result<&mut Agent, AgentError> {
        let rng = self.fork_rng();
        let agent = Agent::of_kind(kind, timing, synth, self.deps(), rng)?;
        self.add_agent(agent)?;
        let idx = self.agents.len() - 1;
        Ok(&mut self.agents[idx])
    }

    pub fn schedule_opening(&mut self, after_ms: Millis, agent: impl Into<String>) {
        let cue = OpeningCue {
            after_ms,
            agent: agent.into(),
        };
        let at = self
            .openings
            .iter()
            .position(|c| c.after_ms > cue.after_ms)
            .unwrap_or(self.openings.len());
        self.openings.insert(at, cue);
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name() == name)
    }

    pub fn agent_mut(&mut self, name: &str) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.name() == name)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), AgentError> {
        let agent = self
            .agent_mut(name)
            .ok_or_else(|| AgentError::UnknownAgent(name.to_string()))?;
        agent.set_enabled(enabled);
        Ok(())
    }

    pub fn playing_count(&self) -> usize {
        self.agents.iter().filter(|a| a.is_playing()).count()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn init_all(&mut self) -> Result<(), AgentError> {
        for agent in &mut self.agents {
            agent.init()?;
        }
        Ok(())
    }

    /// Start the performance clock and deliver the opening phase.
    pub fn start(&mut self) -> Vec<BroadcastEvent> {
        if self.started_at.is_some() {
            return Vec::new();
        }
        let now = self.clock.now_ms();
        self.started_at = Some(now);
        self.last_tick = Some(now);
        self.activity.reset();
        self.conductor.start();
        let state = self.conductor.state();
        info!(
            target: "drift::ensemble",
            agents = self.agents.len(),
            root = state.harmonic_center,
            scale = %state.scale,
            "performance started"
        );
        self.deliver_broadcasts()
    }

    /// Queue `event` on the conductor and deliver everything pending now.
    pub fn broadcast(&mut self, event: BroadcastEvent) -> Vec<BroadcastEvent> {
        self.conductor.broadcast(event);
        self.deliver_broadcasts()
    }

    fn deliver_broadcasts(&mut self) -> Vec<BroadcastEvent> {
        let events = self.conductor.drain_broadcasts();
        for event in &events {
            for agent in &mut self.agents {
                agent.receive(event);
            }
        }
        events
    }

    /// One driver step: evolve the conductor, deliver broadcasts, run due
    /// openings, then update every agent in order.
    pub fn tick(&mut self) -> Result<TickReport, AgentError> {
        let now = self.clock.now_ms();
        let mut report = TickReport {
            now_ms: now,
            ..TickReport::default()
        };
        if self.paused || self.stopped || self.disposed {
            return Ok(report);
        }
        let Some(started) = self.started_at else {
            return Ok(report);
        };
        let delta_ms = now.saturating_sub(self.last_tick.unwrap_or(now));
        self.last_tick = Some(now);

        self.conductor.evolve(ms_to_sec(delta_ms));
        report.broadcasts = self.deliver_broadcasts();

        self.run_openings(now.saturating_sub(started), &mut report)?;

        for i in 0..self.agents.len() {
            let playing = self.playing_count();
            self.conductor.report_playing(playing);
            let agent = &mut self.agents[i];
            if agent.update(delta_ms as f32)? {
                report.triggered.push(agent.name().to_string());
            }
        }
        let playing = self.playing_count();
        self.conductor.report_playing(playing);
        Ok(report)
    }

    fn run_openings(&mut self, since_start: Millis, report: &mut TickReport) -> Result<(), AgentError> {
        while let Some(cue) = self.openings.front() {
            if cue.after_ms > since_start {
                break;
            }
            let name = cue.agent.clone();
            let Some(agent) = self.agent_mut(&name) else {
                warn!(target: "drift::ensemble", agent = %name, "opening cue for unknown agent dropped");
                self.openings.pop_front();
                continue;
            };
            if !agent.is_enabled() {
                self.openings.pop_front();
                continue;
            }
            if !agent.play()? {
                // Governor refused; retry on the next tick.
                break;
            }
            report.triggered.push(name);
            self.openings.pop_front();
        }
        Ok(())
    }

    /// Silence every agent and hold the loop until `resume`.
    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        for agent in &mut self.agents {
            agent.stop();
        }
        self.conductor.report_playing(0);
        info!(target: "drift::ensemble", "paused");
    }

    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.last_tick = Some(self.clock.now_ms());
        info!(target: "drift::ensemble", "resumed");
    }

    pub fn toggle_pause(&mut self) -> bool {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
        self.paused
    }

    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        for agent in &mut self.agents {
            agent.stop();
        }
        self.conductor.report_playing(0);
        info!(target: "drift::ensemble", "stopped");
    }

    /// Stop and release every agent. Only the first call acts.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.stop();
        for agent in &mut self.agents {
            agent.dispose();
        }
        self.disposed = true;
    }
}
