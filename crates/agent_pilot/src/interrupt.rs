//! Safety and opportunistic interrupt handlers.
//!
//! Evaluated every tick, in a fixed order, before any focus behavior: low-HP
//! response, gear repair, then rate-limited self-adaptation. A handler that
//! consumes the tick preempts everything after it.

use agent_pilot_proto::{EntityKind, EquipSlot, Focus, ItemKind, NpcService, ZoneInfo};
use serde::{Deserialize, Serialize};

use crate::context::{
    TickContext, ADAPTATION_INTERVAL_TICKS, LOW_SUPPLIES_HP_PERCENT, OVERLEVEL_MARGIN,
    REPAIR_DURABILITY_PERCENT, SHOPPING_GOLD_THRESHOLD,
};
use crate::world::WorldApi as _;

/// What the low-HP handler did this tick.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LowHpOutcome {
    /// Item consumed, if any. Consuming is what consumes the tick.
    pub consumed_item: Option<String>,
    /// True when the flee threshold forced a move to the rally point.
    pub fled: bool,
}

impl LowHpOutcome {
    pub fn tick_consumed(&self) -> bool {
        self.consumed_item.is_some()
    }
}

/// Strategy-parametrized HP reaction.
///
/// Under the react threshold the handler consumes the first matching food
/// item, else a potion, else any other consumable. Under the stricter flee
/// threshold it additionally moves toward the rally point, whether or not
/// anything was consumed.
pub fn low_hp_response(ctx: &TickContext<'_>) -> LowHpOutcome {
    let mut outcome = LowHpOutcome::default();
    let Some(hp_percent) = ctx.me.hp_percent() else {
        return outcome;
    };

    if hp_percent < ctx.profile.react_hp_percent {
        let consumable = ctx
            .me
            .first_item_of_kind(ItemKind::Food)
            .or_else(|| ctx.me.first_item_of_kind(ItemKind::Potion))
            .or_else(|| ctx.me.first_item_of_kind(ItemKind::Consumable));
        if let Some(item) = consumable {
            if let Ok(result) = ctx
                .world
                .consume_item(ctx.token, ctx.entity_ref, &item.item_id)
            {
                if result.ok {
                    outcome.consumed_item = Some(item.item_id.clone());
                }
            }
        }
    }

    if hp_percent < ctx.profile.flee_hp_percent {
        let _ = ctx
            .world
            .move_toward(ctx.token, ctx.entity_ref, ctx.rally_point);
        outcome.fled = true;
    }

    outcome
}

/// A repair pass that ran this tick. `merchant_entity_id` is absent when no
/// repair-capable merchant exists in the zone; the attempt still consumes
/// the tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairAttempt {
    pub merchant_entity_id: Option<String>,
    pub repaired: bool,
}

/// Scan equipped gear and head for repairs when anything is broken or under
/// the durability floor. Returns `None` when no gear needs attention.
pub fn gear_repair(ctx: &TickContext<'_>) -> Option<RepairAttempt> {
    let damaged = ctx
        .me
        .equipment
        .iter()
        .any(|piece| piece.needs_repair(REPAIR_DURABILITY_PERCENT));
    if !damaged {
        return None;
    }

    let merchant = ctx.nearest(|entity| {
        entity.kind == EntityKind::Npc && entity.services.contains(&NpcService::Repair)
    });
    let Some(merchant) = merchant else {
        return Some(RepairAttempt {
            merchant_entity_id: None,
            repaired: false,
        });
    };

    if !ctx.in_engagement_range(merchant) {
        if let Some(position) = merchant.position {
            let _ = ctx.world.move_toward(ctx.token, ctx.entity_ref, position);
        }
        return Some(RepairAttempt {
            merchant_entity_id: Some(merchant.entity_id.clone()),
            repaired: false,
        });
    }

    let repaired = ctx
        .world
        .repair_all(ctx.token, ctx.entity_ref, &merchant.entity_id)
        .map(|outcome| outcome.ok)
        .unwrap_or(false);
    Some(RepairAttempt {
        merchant_entity_id: Some(merchant.entity_id.clone()),
        repaired,
    })
}

/// A goal override decided by self-adaptation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusOverride {
    pub from: Focus,
    pub to: Focus,
    #[serde(default)]
    pub target_zone: Option<String>,
}

/// Periodic re-planning of the configured focus.
///
/// Runs only when the focus is not idle and only on every
/// [`ADAPTATION_INTERVAL_TICKS`]th tick since the last focus change. The
/// three checks run in strict priority order and at most one override is
/// applied per invocation.
pub fn self_adaptation(
    ctx: &TickContext<'_>,
    ticks_since_focus_change: u64,
) -> Option<FocusOverride> {
    if ctx.config.focus == Focus::Idle {
        return None;
    }
    if ticks_since_focus_change == 0 || ticks_since_focus_change % ADAPTATION_INTERVAL_TICKS != 0 {
        return None;
    }

    // 1. Unarmed but funded: go shopping.
    if ctx.me.equipped(EquipSlot::Weapon).is_none() {
        let gold = ctx
            .world
            .gold_balance(ctx.token, ctx.custodial_wallet)
            .unwrap_or(0);
        if gold >= SHOPPING_GOLD_THRESHOLD {
            return Some(FocusOverride {
                from: ctx.config.focus,
                to: Focus::Shopping,
                target_zone: None,
            });
        }
    }

    // 2. Out of supplies while hurt: go cook.
    let no_supplies =
        !ctx.me.has_item_kind(ItemKind::Food) && !ctx.me.has_item_kind(ItemKind::Potion);
    if no_supplies {
        if let Some(hp_percent) = ctx.me.hp_percent() {
            if hp_percent < LOW_SUPPLIES_HP_PERCENT {
                return Some(FocusOverride {
                    from: ctx.config.focus,
                    to: Focus::Cooking,
                    target_zone: None,
                });
            }
        }
    }

    // 3. Overleveled for the zone: move on to the best qualifying zone.
    let level = ctx.my_level();
    let current = ctx.world.zone_info(ctx.token, &ctx.entity_ref.zone_id).ok()?;
    if level >= current.level_requirement.saturating_add(OVERLEVEL_MARGIN) {
        let zones = ctx.world.list_zones(ctx.token).unwrap_or_default();
        let best = highest_qualifying_zone(&zones, level);
        if let Some(best) = best {
            if best.zone_id != ctx.entity_ref.zone_id {
                return Some(FocusOverride {
                    from: ctx.config.focus,
                    to: Focus::Traveling,
                    target_zone: Some(best.zone_id.clone()),
                });
            }
        }
    }

    None
}

/// The highest-requirement zone the agent's level qualifies for.
fn highest_qualifying_zone(zones: &[ZoneInfo], level: u32) -> Option<&ZoneInfo> {
    zones
        .iter()
        .filter(|zone| zone.level_requirement <= level)
        .max_by(|a, b| {
            a.level_requirement
                .cmp(&b.level_requirement)
                .then_with(|| a.zone_id.cmp(&b.zone_id).reverse())
        })
}
