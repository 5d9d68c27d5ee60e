use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::timebase::Millis;
use crate::life::activity::ActivityParams;
use crate::life::agent::AgentTiming;
use crate::life::behavior::AgentKind;
use crate::life::conductor::{ConductorParams, PhaseCue};
use crate::life::event::Phase;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("[agents.{kind}] min_interval_ms {min_ms} exceeds max_interval_ms {max_ms}")]
    Intervals {
        kind: &'static str,
        min_ms: Millis,
        max_ms: Millis,
    },
    #[error("[agents.{kind}] volume {volume} is outside [0, 1]")]
    Volume { kind: &'static str, volume: f32 },
    #[error("[run] tick_ms must be positive")]
    ZeroTick,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConductorConfig {
    #[serde(default = "ConductorConfig::default_min_agent_spacing_ms")]
    pub min_agent_spacing_ms: Millis,
    #[serde(default = "ConductorConfig::default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,
    #[serde(default = "ConductorConfig::default_true")]
    pub evolve_state: bool,
    #[serde(default = "ConductorConfig::default_true")]
    pub randomize_initial_state: bool,
    #[serde(default = "ConductorConfig::default_density_step")]
    pub density_step: f32,
    #[serde(default = "ConductorConfig::default_scale_shift_per_sec")]
    pub scale_shift_per_sec: f32,
    #[serde(default = "ConductorConfig::default_key_change_per_sec")]
    pub key_change_per_sec: f32,
    #[serde(default = "ConductorConfig::default_key_change_notice_sec")]
    pub key_change_notice_sec: f32,
    #[serde(default = "ConductorConfig::default_flowering_at_sec")]
    pub flowering_at_sec: f32,
    #[serde(default = "ConductorConfig::default_climax_at_sec")]
    pub climax_at_sec: f32,
    #[serde(default = "ConductorConfig::default_dissolving_at_sec")]
    pub dissolving_at_sec: f32,
}

impl ConductorConfig {
    fn default_min_agent_spacing_ms() -> Millis {
        500
    }
    fn default_max_concurrent_agents() -> usize {
        4
    }
    fn default_true() -> bool {
        true
    }
    fn default_density_step() -> f32 {
        0.15
    }
    fn default_scale_shift_per_sec() -> f32 {
        0.0009
    }
    fn default_key_change_per_sec() -> f32 {
        0.00045
    }
    fn default_key_change_notice_sec() -> f32 {
        30.0
    }
    fn default_flowering_at_sec() -> f32 {
        90.0
    }
    fn default_climax_at_sec() -> f32 {
        360.0
    }
    fn default_dissolving_at_sec() -> f32 {
        540.0
    }

    pub fn params(&self) -> ConductorParams {
        ConductorParams {
            min_agent_spacing_ms: self.min_agent_spacing_ms,
            max_concurrent_agents: self.max_concurrent_agents,
            evolve_state: self.evolve_state,
            density_step: self.density_step,
            scale_shift_per_sec: self.scale_shift_per_sec,
            key_change_per_sec: self.key_change_per_sec,
            key_change_notice_sec: self.key_change_notice_sec,
            phase_schedule: vec![
                PhaseCue {
                    at_sec: self.flowering_at_sec,
                    phase: Phase::Flowering,
                },
                PhaseCue {
                    at_sec: self.climax_at_sec,
                    phase: Phase::Climax,
                },
                PhaseCue {
                    at_sec: self.dissolving_at_sec,
                    phase: Phase::Dissolving,
                },
            ],
        }
    }
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            min_agent_spacing_ms: Self::default_min_agent_spacing_ms(),
            max_concurrent_agents: Self::default_max_concurrent_agents(),
            evolve_state: true,
            randomize_initial_state: true,
            density_step: Self::default_density_step(),
            scale_shift_per_sec: Self::default_scale_shift_per_sec(),
            key_change_per_sec: Self::default_key_change_per_sec(),
            key_change_notice_sec: Self::default_key_change_notice_sec(),
            flowering_at_sec: Self::default_flowering_at_sec(),
            climax_at_sec: Self::default_climax_at_sec(),
            dissolving_at_sec: Self::default_dissolving_at_sec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "ActivityConfig::default_window_ms")]
    pub window_ms: Millis,
    #[serde(default = "ActivityConfig::default_saturation_events")]
    pub saturation_events: usize,
}

impl ActivityConfig {
    fn default_window_ms() -> Millis {
        10_000
    }
    fn default_saturation_events() -> usize {
        6
    }

    pub fn params(&self) -> ActivityParams {
        ActivityParams {
            window_ms: self.window_ms,
            saturation_events: self.saturation_events,
        }
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            window_ms: Self::default_window_ms(),
            saturation_events: Self::default_saturation_events(),
        }
    }
}

/// Per-agent overrides; unset fields fall back to the variant's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_interval_ms: Option<Millis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_interval_ms: Option<Millis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
}

impl AgentOverrides {
    fn from_timing(t: AgentTiming) -> Self {
        Self {
            enabled: Some(t.enabled),
            min_interval_ms: Some(t.min_interval_ms),
            max_interval_ms: Some(t.max_interval_ms),
            volume: Some(t.volume),
        }
    }

    pub fn resolve(&self, base: AgentTiming) -> AgentTiming {
        AgentTiming {
            enabled: self.enabled.unwrap_or(base.enabled),
            min_interval_ms: self.min_interval_ms.unwrap_or(base.min_interval_ms),
            max_interval_ms: self.max_interval_ms.unwrap_or(base.max_interval_ms),
            volume: self.volume.unwrap_or(base.volume),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default)]
    pub granular: AgentOverrides,
    #[serde(default)]
    pub texture: AgentOverrides,
    #[serde(default)]
    pub atmosphere: AgentOverrides,
}

impl AgentsConfig {
    pub fn overrides(&self, kind: AgentKind) -> &AgentOverrides {
        match kind {
            AgentKind::Granular => &self.granular,
            AgentKind::Texture => &self.texture,
            AgentKind::Atmosphere => &self.atmosphere,
        }
    }

    pub fn timing(&self, kind: AgentKind) -> AgentTiming {
        self.overrides(kind).resolve(kind.default_timing())
    }

    fn with_defaults_spelled_out() -> Self {
        Self {
            granular: AgentOverrides::from_timing(AgentKind::Granular.default_timing()),
            texture: AgentOverrides::from_timing(AgentKind::Texture.default_timing()),
            atmosphere: AgentOverrides::from_timing(AgentKind::Atmosphere.default_timing()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningConfig {
    pub agent: AgentKind,
    pub after_ms: Millis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "RunConfig::default_seed")]
    pub seed: u64,
    #[serde(default = "RunConfig::default_tick_ms")]
    pub tick_ms: Millis,
    #[serde(default = "RunConfig::default_duration_sec")]
    pub duration_sec: f32,
    #[serde(default = "RunConfig::default_openings")]
    pub openings: Vec<OpeningConfig>,
}

impl RunConfig {
    fn default_seed() -> u64 {
        7
    }
    fn default_tick_ms() -> Millis {
        50
    }
    fn default_duration_sec() -> f32 {
        600.0
    }
    fn default_openings() -> Vec<OpeningConfig> {
        vec![OpeningConfig {
            agent: AgentKind::Texture,
            after_ms: 3_500,
        }]
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: Self::default_seed(),
            tick_ms: Self::default_tick_ms(),
            duration_sec: Self::default_duration_sec(),
            openings: Self::default_openings(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DriftConfig {
    #[serde(default)]
    pub conductor: ConductorConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub run: RunConfig,
}

impl DriftConfig {
    fn format_f32_compact(x: f32) -> String {
        let mut s = format!("{:.6}", x);
        while s.contains('.') && s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        if s.is_empty() { "0".to_string() } else { s }
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let cfg: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(err) => warn!(target: "drift::config", error = %err, "using defaults"),
            }
            return Self::default();
        }

        // No file yet: write every default, commented out, and use them.
        let default_cfg = Self::default();
        match Self::commented_defaults() {
            Ok(text) => {
                if let Err(err) = fs::write(path_obj, text) {
                    warn!(target: "drift::config", path, error = %err, "failed to write default config");
                } else {
                    info!(target: "drift::config", path, "wrote default config");
                }
            }
            Err(err) => {
                warn!(target: "drift::config", error = %err, "failed to serialize default config");
            }
        }
        default_cfg
    }

    /// Defaults as TOML with every value line commented out.
    pub fn commented_defaults() -> Result<String, toml::ser::Error> {
        let spelled_out = Self {
            agents: AgentsConfig::with_defaults_spelled_out(),
            ..Self::default()
        };
        let text = toml::to_string_pretty(&spelled_out)?;
        let mut commented = String::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                commented.push('\n');
            } else if trimmed.starts_with('[') && !trimmed.starts_with("[[") && trimmed.ends_with(']')
            {
                commented.push_str(line);
                commented.push('\n');
            } else {
                let mut out_line = line.to_string();
                if let Some((lhs, rhs)) = line.split_once('=') {
                    let rhs_trim = rhs.trim();
                    if rhs_trim.contains('.')
                        && !rhs_trim.contains('"')
                        && let Ok(val) = rhs_trim.parse::<f32>()
                    {
                        let mut formatted = Self::format_f32_compact(val);
                        if !formatted.contains('.') {
                            formatted.push_str(".0");
                        }
                        out_line = format!("{} = {}", lhs.trim(), formatted);
                    }
                }
                commented.push_str("# ");
                commented.push_str(&out_line);
                commented.push('\n');
            }
        }
        Ok(commented)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in AgentKind::ALL {
            let t = self.agents.timing(kind);
            if t.min_interval_ms > t.max_interval_ms {
                return Err(ConfigError::Intervals {
                    kind: kind.key(),
                    min_ms: t.min_interval_ms,
                    max_ms: t.max_interval_ms,
                });
            }
            if !(0.0..=1.0).contains(&t.volume) {
                return Err(ConfigError::Volume {
                    kind: kind.key(),
                    volume: t.volume,
                });
            }
        }
        if self.run.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }
}
