//! Shared per-tick context handed to interrupt handlers and focus behaviors.

use agent_pilot_proto::{AgentConfig, EntityRef, Position, Strategy, WorldEntity, ZoneState};

use crate::store::ConfigStore;
use crate::world::WorldApi;

/// Distance at or under which an entity can be acted on directly.
pub const ENGAGEMENT_RANGE: f64 = 5.0;
/// Equipment below this durability percentage is considered damaged.
pub const REPAIR_DURABILITY_PERCENT: u32 = 20;
/// Minimum gold before self-adaptation sends an unarmed agent shopping.
pub const SHOPPING_GOLD_THRESHOLD: u64 = 10;
/// HP percentage under which having no consumables triggers cooking.
pub const LOW_SUPPLIES_HP_PERCENT: u32 = 70;
/// Level lead over the zone requirement that triggers moving on.
pub const OVERLEVEL_MARGIN: u32 = 5;
/// Self-adaptation runs every this many ticks since the last focus change.
pub const ADAPTATION_INTERVAL_TICKS: u64 = 30;

/// Numeric thresholds derived from the configured [`Strategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyProfile {
    /// HP percentage under which a consumable is attempted.
    pub react_hp_percent: u32,
    /// HP percentage under which the agent flees to the rally point.
    pub flee_hp_percent: u32,
    /// Levels above the agent's own that combat will still engage.
    pub engagement_level_bonus: u32,
}

impl StrategyProfile {
    pub fn for_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Aggressive => Self {
                react_hp_percent: 15,
                flee_hp_percent: 5,
                engagement_level_bonus: 5,
            },
            Strategy::Balanced => Self {
                react_hp_percent: 25,
                flee_hp_percent: 15,
                engagement_level_bonus: 2,
            },
            Strategy::Defensive => Self {
                react_hp_percent: 40,
                flee_hp_percent: 30,
                engagement_level_bonus: 0,
            },
        }
    }

    /// Highest mob level combat will engage for an agent of `level`.
    pub fn engagement_cap(&self, level: u32) -> u32 {
        level.saturating_add(self.engagement_level_bonus)
    }
}

/// Everything one tick's decision code may read or act through.
///
/// Borrowed for the duration of a single tick; nothing here outlives it.
pub struct TickContext<'a> {
    pub world: &'a dyn WorldApi,
    pub store: &'a dyn ConfigStore,
    pub token: &'a str,
    pub owner: &'a str,
    pub custodial_wallet: &'a str,
    pub entity_ref: &'a EntityRef,
    pub me: &'a WorldEntity,
    pub zone: &'a ZoneState,
    pub config: &'a AgentConfig,
    pub profile: StrategyProfile,
    pub rally_point: Position,
    pub now: u64,
}

impl<'a> TickContext<'a> {
    pub fn my_level(&self) -> u32 {
        self.me.level.unwrap_or(1)
    }

    pub fn distance_to(&self, entity: &WorldEntity) -> Option<f64> {
        self.me.distance_to(entity)
    }

    /// True when the entity is close enough to act on. An unknown distance
    /// counts as in range: without positions there is nothing to path to, so
    /// the action itself is the only probe left.
    pub fn in_engagement_range(&self, entity: &WorldEntity) -> bool {
        match self.distance_to(entity) {
            Some(distance) => distance <= ENGAGEMENT_RANGE,
            None => true,
        }
    }

    /// Nearest other entity in the current zone matching the predicate.
    pub fn nearest(&self, predicate: impl Fn(&WorldEntity) -> bool) -> Option<&'a WorldEntity> {
        self.zone
            .entities
            .values()
            .filter(|entity| entity.entity_id != self.me.entity_id)
            .filter(|entity| predicate(entity))
            .min_by(|a, b| {
                let da = self.distance_to(a).unwrap_or(f64::MAX);
                let db = self.distance_to(b).unwrap_or(f64::MAX);
                da.partial_cmp(&db)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.entity_id.cmp(&b.entity_id))
            })
    }
}
