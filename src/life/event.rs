use serde::{Deserialize, Serialize};

/// Composition phases, in performance order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Genesis,
    Flowering,
    Climax,
    Dissolving,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Genesis,
        Phase::Flowering,
        Phase::Climax,
        Phase::Dissolving,
    ];
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Genesis => "genesis",
            Phase::Flowering => "flowering",
            Phase::Climax => "climax",
            Phase::Dissolving => "dissolving",
        };
        write!(f, "{name}")
    }
}

/// One-way notification from the conductor to every registered agent.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    KeyChangePending { new_root: u8, in_seconds: f32 },
    PhaseChange { phase: Phase },
    DensityChange { density: f32 },
    ClimaxBuilding,
    Dissolving,
}

impl std::fmt::Display for BroadcastEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BroadcastEvent::KeyChangePending {
                new_root,
                in_seconds,
            } => write!(f, "KeyChangePending(root={new_root}, in={in_seconds:.0}s)"),
            BroadcastEvent::PhaseChange { phase } => write!(f, "PhaseChange({phase})"),
            BroadcastEvent::DensityChange { density } => {
                write!(f, "DensityChange({density:.2})")
            }
            BroadcastEvent::ClimaxBuilding => write!(f, "ClimaxBuilding"),
            BroadcastEvent::Dissolving => write!(f, "Dissolving"),
        }
    }
}
