//! Per-agent configuration and activity shapes shared with the config store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The agent's current high-level goal, as configured in the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Focus {
    Questing,
    Combat,
    Gathering,
    Crafting,
    Alchemy,
    Cooking,
    Enchanting,
    Trading,
    Shopping,
    Traveling,
    #[default]
    Idle,
}

impl fmt::Display for Focus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Focus::Questing => "questing",
            Focus::Combat => "combat",
            Focus::Gathering => "gathering",
            Focus::Crafting => "crafting",
            Focus::Alchemy => "alchemy",
            Focus::Cooking => "cooking",
            Focus::Enchanting => "enchanting",
            Focus::Trading => "trading",
            Focus::Shopping => "shopping",
            Focus::Traveling => "traveling",
            Focus::Idle => "idle",
        };
        f.write_str(name)
    }
}

/// Risk posture that parametrizes the numeric thresholds used by every
/// behavior routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Aggressive,
    #[default]
    Balanced,
    Defensive,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Aggressive => "aggressive",
            Strategy::Balanced => "balanced",
            Strategy::Defensive => "defensive",
        };
        f.write_str(name)
    }
}

/// Weak reference to the agent's avatar in the world. A lookup hint, never an
/// ownership relation: the world may move or remove the underlying entity at
/// any time, so the ref must be revalidated once a read against it fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_id: String,
    pub zone_id: String,
}

/// Per-agent goal state owned by the external config store.
///
/// Re-read every tick and never cached across ticks: this is the single
/// source of truth for "what should I be doing".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub enabled: bool,
    #[serde(default)]
    pub focus: Focus,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub target_zone: Option<String>,
    #[serde(default)]
    pub history: Vec<ActivityLogEntry>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            focus: Focus::default(),
            strategy: Strategy::default(),
            target_zone: None,
            history: Vec::new(),
        }
    }
}

/// Partial update applied to an [`AgentConfig`] in the store.
///
/// `clear_target_zone` exists because "unset the target" and "leave the
/// target alone" are different patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AgentConfigPatch {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub focus: Option<Focus>,
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub target_zone: Option<String>,
    #[serde(default)]
    pub clear_target_zone: bool,
}

impl AgentConfigPatch {
    pub fn focus(focus: Focus) -> Self {
        Self {
            focus: Some(focus),
            ..Self::default()
        }
    }

    pub fn focus_with_target(focus: Focus, target_zone: impl Into<String>) -> Self {
        Self {
            focus: Some(focus),
            target_zone: Some(target_zone.into()),
            ..Self::default()
        }
    }

    /// Apply this patch to a config, in store-side merge order.
    pub fn apply(&self, config: &mut AgentConfig) {
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(focus) = self.focus {
            config.focus = focus;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(target_zone) = &self.target_zone {
            config.target_zone = Some(target_zone.clone());
        }
        if self.clear_target_zone {
            config.target_zone = None;
        }
    }
}

/// Who produced an activity log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityRole {
    UserDirective,
    AgentReply,
    Activity,
    System,
}

/// One append-only record of what the agent did, for spectator visibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub role: ActivityRole,
    pub text: String,
    pub timestamp: u64,
}

impl ActivityLogEntry {
    pub fn activity(text: impl Into<String>, timestamp: u64) -> Self {
        Self {
            role: ActivityRole::Activity,
            text: text.into(),
            timestamp,
        }
    }

    pub fn system(text: impl Into<String>, timestamp: u64) -> Self {
        Self {
            role: ActivityRole::System,
            text: text.into(),
            timestamp,
        }
    }
}
