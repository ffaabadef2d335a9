//! Focus behavior dispatch.
//!
//! A pure mapping from `(focus, strategy)` to one concrete routine. Dispatch
//! is an exhaustive match over [`Focus`], so adding a focus value is a
//! compile-time-checked change. Routines never surface call failures to the
//! loop: a failed or empty result falls back to the next-most-sensible
//! routine (crafting → gathering, shopping → combat, and so on).

use agent_pilot_proto::{
    AgentConfigPatch, EntityKind, EquipSlot, Focus, ItemKind, NpcService, Position, Profession,
    ResourceKind, StationKind, WorldEntity, ZoneNeighbor, EQUIPMENT_SLOTS,
};
use serde::{Deserialize, Serialize};

use crate::context::TickContext;
use crate::store::ConfigStore as _;
use crate::world::{WorldApi as _, REASON_MISSING_MATERIALS};

#[cfg(test)]
mod tests;

/// The single outward-visible action a focus routine took this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PilotAction {
    Moved { x: f64, y: f64 },
    Attacked { target_entity_id: String },
    QuestAccepted { quest_id: String },
    Gathered { node_entity_id: String },
    ProfessionLearning { profession: Profession },
    Crafted { station_entity_id: String, recipe_id: String },
    Enchanted { altar_entity_id: String, item_id: String },
    Purchased { listing_id: String, item_id: Option<String> },
    TraveledToward { zone_id: String },
    FocusReverted { to: Focus },
}

/// Run the behavior for the currently configured focus.
///
/// Returns `None` when the routine had nothing to do (idle, or every
/// fallback came up empty).
pub fn run_focus_behavior(ctx: &TickContext<'_>) -> Option<PilotAction> {
    match ctx.config.focus {
        Focus::Questing => questing(ctx),
        Focus::Combat => combat(ctx),
        Focus::Gathering => gathering(ctx),
        Focus::Crafting => crafting_chain(ctx, StationKind::Forge),
        Focus::Alchemy => crafting_chain(ctx, StationKind::AlchemyLab),
        Focus::Cooking => crafting_chain(ctx, StationKind::Campfire),
        Focus::Enchanting => enchanting(ctx),
        Focus::Trading | Focus::Shopping => shopping(ctx),
        Focus::Traveling => traveling(ctx),
        Focus::Idle => None,
    }
}

// ============================================================================
// Questing
// ============================================================================

fn questing(ctx: &TickContext<'_>) -> Option<PilotAction> {
    let quests = ctx
        .world
        .available_quests(ctx.token, ctx.entity_ref)
        .unwrap_or_default();
    let Some(quest) = quests.first() else {
        return combat(ctx);
    };

    // "Already accepted" counts as success; any other rejection still falls
    // through to combat so the tick makes progress either way.
    let accepted = ctx
        .world
        .accept_quest(ctx.token, ctx.entity_ref, &quest.quest_id)
        .map(|outcome| outcome.ok || outcome.reason_is(crate::world::REASON_ALREADY_ACCEPTED))
        .unwrap_or(false);

    match combat(ctx) {
        Some(action) => Some(action),
        None if accepted => Some(PilotAction::QuestAccepted {
            quest_id: quest.quest_id.clone(),
        }),
        None => None,
    }
}

// ============================================================================
// Combat
// ============================================================================

fn combat(ctx: &TickContext<'_>) -> Option<PilotAction> {
    let cap = ctx.profile.engagement_cap(ctx.my_level());
    let mut candidates: Vec<&WorldEntity> = ctx
        .zone
        .entities
        .values()
        .filter(|entity| entity.entity_id != ctx.me.entity_id)
        .filter(|entity| matches!(entity.kind, EntityKind::Mob | EntityKind::Boss))
        .filter(|entity| entity.is_alive())
        .filter(|entity| entity.level.unwrap_or(u32::MAX) <= cap)
        .collect();

    if ctx.profile.engagement_level_bonus >= 5 {
        // Aggressive: strongest eligible target first, distance breaks ties.
        candidates.sort_by(|a, b| {
            b.level
                .unwrap_or(0)
                .cmp(&a.level.unwrap_or(0))
                .then_with(|| compare_distance(ctx, a, b))
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
    } else {
        candidates.sort_by(|a, b| {
            compare_distance(ctx, a, b).then_with(|| a.entity_id.cmp(&b.entity_id))
        });
    }

    let target = candidates.first()?;
    if !ctx.in_engagement_range(target) {
        return move_toward(ctx, target);
    }
    let _ = ctx
        .world
        .attack(ctx.token, ctx.entity_ref, &target.entity_id);
    Some(PilotAction::Attacked {
        target_entity_id: target.entity_id.clone(),
    })
}

fn compare_distance(
    ctx: &TickContext<'_>,
    a: &WorldEntity,
    b: &WorldEntity,
) -> std::cmp::Ordering {
    let da = ctx.distance_to(a).unwrap_or(f64::MAX);
    let db = ctx.distance_to(b).unwrap_or(f64::MAX);
    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
}

// ============================================================================
// Gathering
// ============================================================================

fn gathering(ctx: &TickContext<'_>) -> Option<PilotAction> {
    let node = ctx.nearest(|entity| {
        entity.kind == EntityKind::ResourceNode && entity.resource_kind.is_some()
    });
    let Some(node) = node else {
        return combat(ctx);
    };

    if !ctx.in_engagement_range(node) {
        return move_toward(ctx, node);
    }

    let Some(resource_kind) = node.resource_kind else {
        return combat(ctx);
    };
    let profession = Profession::for_resource(resource_kind);
    if !ctx.me.professions.contains(&profession) {
        return learn_profession_step(ctx, profession);
    }

    let _ = ctx.world.gather(ctx.token, ctx.entity_ref, &node.entity_id);
    Some(PilotAction::Gathered {
        node_entity_id: node.entity_id.clone(),
    })
}

/// Learning a profession may itself require walking to a trainer. When no
/// trainer is around the learn command is attempted directly; worlds without
/// trainer gating accept it.
fn learn_profession_step(ctx: &TickContext<'_>, profession: Profession) -> Option<PilotAction> {
    let trainer = ctx.nearest(|entity| {
        entity.kind == EntityKind::Npc && entity.services.contains(&NpcService::Trainer)
    });
    if let Some(trainer) = trainer {
        if !ctx.in_engagement_range(trainer) {
            return move_toward(ctx, trainer);
        }
    }
    let _ = ctx
        .world
        .learn_profession(ctx.token, ctx.entity_ref, profession);
    Some(PilotAction::ProfessionLearning { profession })
}

// ============================================================================
// Crafting chains (forge / alchemy lab / campfire)
// ============================================================================

fn crafting_chain(ctx: &TickContext<'_>, station_kind: StationKind) -> Option<PilotAction> {
    let profession = Profession::for_station(station_kind);
    if !ctx.me.professions.contains(&profession) {
        return learn_profession_step(ctx, profession);
    }

    let station = ctx.nearest(|entity| {
        entity.kind == EntityKind::CraftingStation && entity.station_kind == Some(station_kind)
    });
    let Some(station) = station else {
        return combat(ctx);
    };

    if !ctx.in_engagement_range(station) {
        return move_toward(ctx, station);
    }

    let mut recipes = ctx
        .world
        .station_recipes(ctx.token, &station.entity_id)
        .unwrap_or_default();
    recipes.sort_by(|a, b| {
        a.priority
            .unwrap_or(u32::MAX)
            .cmp(&b.priority.unwrap_or(u32::MAX))
            .then_with(|| a.recipe_id.cmp(&b.recipe_id))
    });

    for recipe in &recipes {
        match ctx
            .world
            .craft(ctx.token, ctx.entity_ref, &station.entity_id, &recipe.recipe_id)
        {
            Ok(outcome) if outcome.ok => {
                return Some(PilotAction::Crafted {
                    station_entity_id: station.entity_id.clone(),
                    recipe_id: recipe.recipe_id.clone(),
                });
            }
            Ok(outcome) if outcome.reason_is(REASON_MISSING_MATERIALS) => continue,
            Ok(_) | Err(_) => continue,
        }
    }

    // Nothing craftable: go acquire materials instead of grinding mobs.
    gathering(ctx)
}

// ============================================================================
// Enchanting
// ============================================================================

fn enchanting(ctx: &TickContext<'_>) -> Option<PilotAction> {
    let has_weapon = ctx.me.equipped(EquipSlot::Weapon).is_some();
    let consumable = ctx.me.first_item_of_kind(ItemKind::Enchantment);

    let Some(consumable) = consumable else {
        // No enchantment in the bag: brew one.
        return crafting_chain(ctx, StationKind::AlchemyLab);
    };
    if !has_weapon {
        return gathering(ctx);
    }

    let altar = ctx.nearest(|entity| entity.kind == EntityKind::Altar);
    let Some(altar) = altar else {
        return combat(ctx);
    };
    if !ctx.in_engagement_range(altar) {
        return move_toward(ctx, altar);
    }

    let _ = ctx.world.enchant(
        ctx.token,
        ctx.entity_ref,
        &altar.entity_id,
        &consumable.item_id,
    );
    Some(PilotAction::Enchanted {
        altar_entity_id: altar.entity_id.clone(),
        item_id: consumable.item_id.clone(),
    })
}

// ============================================================================
// Shopping / trading
// ============================================================================

fn shopping(ctx: &TickContext<'_>) -> Option<PilotAction> {
    let empty_slots: Vec<EquipSlot> = EQUIPMENT_SLOTS
        .iter()
        .copied()
        .filter(|slot| ctx.me.equipped(*slot).is_none())
        .collect();
    if empty_slots.is_empty() {
        return combat(ctx);
    }

    let gold = ctx
        .world
        .gold_balance(ctx.token, ctx.custodial_wallet)
        .unwrap_or(0);

    let merchant = ctx.nearest(|entity| {
        entity.kind == EntityKind::Npc && entity.services.contains(&NpcService::Shop)
    });
    let Some(merchant) = merchant else {
        return combat(ctx);
    };
    if !ctx.in_engagement_range(merchant) {
        return move_toward(ctx, merchant);
    }

    let listings = ctx
        .world
        .shop_listings(ctx.token, &merchant.entity_id)
        .unwrap_or_default();

    // One purchase per tick keeps the loop responsive to interruption.
    for slot in empty_slots {
        let cheapest = listings
            .iter()
            .filter(|listing| listing.slot == Some(slot))
            .filter(|listing| listing.price.unwrap_or(u64::MAX) <= gold)
            .min_by(|a, b| {
                a.price
                    .unwrap_or(u64::MAX)
                    .cmp(&b.price.unwrap_or(u64::MAX))
                    .then_with(|| a.listing_id.cmp(&b.listing_id))
            });
        let Some(listing) = cheapest else {
            continue;
        };

        let bought = ctx
            .world
            .buy_item(ctx.token, ctx.entity_ref, &merchant.entity_id, &listing.listing_id)
            .map(|outcome| outcome.ok)
            .unwrap_or(false);
        if !bought {
            continue;
        }
        if let Some(item_id) = &listing.item_id {
            let _ = ctx.world.equip_item(ctx.token, ctx.entity_ref, item_id);
        }
        return Some(PilotAction::Purchased {
            listing_id: listing.listing_id.clone(),
            item_id: listing.item_id.clone(),
        });
    }

    // Fully geared slots aside, nothing affordable remained.
    combat(ctx)
}

// ============================================================================
// Traveling
// ============================================================================

fn traveling(ctx: &TickContext<'_>) -> Option<PilotAction> {
    let target = match &ctx.config.target_zone {
        Some(target) if target != &ctx.entity_ref.zone_id => target.clone(),
        _ => {
            // Arrived, or nothing to travel to: hand the reins back.
            let patch = AgentConfigPatch {
                focus: Some(Focus::Questing),
                clear_target_zone: true,
                ..AgentConfigPatch::default()
            };
            let _ = ctx.store.patch_agent_config(ctx.owner, &patch);
            return Some(PilotAction::FocusReverted {
                to: Focus::Questing,
            });
        }
    };

    let Ok(current) = ctx.world.zone_info(ctx.token, &ctx.entity_ref.zone_id) else {
        return combat(ctx);
    };
    let level = ctx.my_level();

    if let Some(neighbor) = current
        .neighbors
        .iter()
        .find(|neighbor| neighbor.zone_id == target)
    {
        if level >= neighbor.level_requirement {
            let _ = ctx.world.travel(ctx.token, ctx.entity_ref, &target);
            return Some(PilotAction::TraveledToward { zone_id: target });
        }
        // Level gate: grind until the requirement is met.
        return combat(ctx);
    }

    // Not adjacent: step through the neighbor closest to the target in the
    // linear zone ordering, and only when that step strictly narrows the
    // distance, so two zones can never trade the agent back and forth.
    let Ok(target_info) = ctx.world.zone_info(ctx.token, &target) else {
        return combat(ctx);
    };
    let (Some(current_order), Some(target_order)) = (current.order_index, target_info.order_index)
    else {
        return combat(ctx);
    };
    let Some(neighbor) = next_hop_toward(&current.neighbors, current_order, target_order) else {
        return combat(ctx);
    };
    if level < neighbor.level_requirement {
        return combat(ctx);
    }

    let _ = ctx.world.travel(ctx.token, ctx.entity_ref, &neighbor.zone_id);
    Some(PilotAction::TraveledToward {
        zone_id: neighbor.zone_id.clone(),
    })
}

// ============================================================================
// Shared movement helper
// ============================================================================

fn move_toward(ctx: &TickContext<'_>, target: &WorldEntity) -> Option<PilotAction> {
    let position: Position = target.position?;
    let _ = ctx.world.move_toward(ctx.token, ctx.entity_ref, position);
    Some(PilotAction::Moved {
        x: position.x,
        y: position.y,
    })
}

/// Pick the neighbor used as the next hop toward `target_order`, if any
/// strictly narrows the distance. Exposed for the travel-convergence tests.
pub fn next_hop_toward<'a>(
    neighbors: &'a [ZoneNeighbor],
    current_order: i64,
    target_order: i64,
) -> Option<&'a ZoneNeighbor> {
    let current_distance = (current_order - target_order).abs();
    neighbors
        .iter()
        .filter_map(|neighbor| {
            neighbor
                .order_index
                .map(|order| ((order - target_order).abs(), neighbor))
        })
        .filter(|(distance, _)| *distance < current_distance)
        .min_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.zone_id.cmp(&b.zone_id)))
        .map(|(_, neighbor)| neighbor)
}
