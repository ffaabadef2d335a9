//! Typed shapes for payloads crossing the world API boundary.
//!
//! The world owns these schemas; this crate only pins down the subset the
//! control loop reads. Every field the loop does not control is optional and
//! `#[serde(default)]`: a missing field decodes to its absent case instead of
//! failing the whole payload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Geometry
// ============================================================================

/// World-space coordinate inside a zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Coarse classification of a world entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Mob,
    Boss,
    Npc,
    ResourceNode,
    CraftingStation,
    Altar,
    #[serde(other)]
    #[default]
    Unknown,
}

/// What a resource node yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Ore,
    Flower,
}

/// Which crafting discipline a station serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationKind {
    Forge,
    AlchemyLab,
    Campfire,
}

/// Services an NPC offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcService {
    Repair,
    Shop,
    Trainer,
}

/// Professions an avatar can learn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profession {
    Mining,
    Herbalism,
    Smithing,
    Alchemy,
    Cooking,
}

impl Profession {
    pub fn for_resource(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Ore => Profession::Mining,
            ResourceKind::Flower => Profession::Herbalism,
        }
    }

    pub fn for_station(kind: StationKind) -> Self {
        match kind {
            StationKind::Forge => Profession::Smithing,
            StationKind::AlchemyLab => Profession::Alchemy,
            StationKind::Campfire => Profession::Cooking,
        }
    }
}

/// Coarse classification of an inventory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Food,
    Potion,
    Consumable,
    Weapon,
    Armor,
    Material,
    Enchantment,
    #[serde(other)]
    #[default]
    Unknown,
}

/// One inventory stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub item_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// Equipment slot identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    Head,
    Chest,
    Legs,
    Boots,
    Weapon,
    Offhand,
}

/// The full slot set an avatar can fill, in shopping priority order.
pub const EQUIPMENT_SLOTS: [EquipSlot; 6] = [
    EquipSlot::Weapon,
    EquipSlot::Chest,
    EquipSlot::Head,
    EquipSlot::Legs,
    EquipSlot::Boots,
    EquipSlot::Offhand,
];

/// One equipped piece. An absent `item_id` means the slot is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentPiece {
    pub slot: EquipSlot,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub durability: Option<u32>,
    #[serde(default)]
    pub max_durability: Option<u32>,
    #[serde(default)]
    pub broken: Option<bool>,
}

impl EquipmentPiece {
    /// True when the piece needs repair: explicitly broken, or durability
    /// known to be below the given percentage of its maximum.
    pub fn needs_repair(&self, threshold_percent: u32) -> bool {
        if self.item_id.is_none() {
            return false;
        }
        if self.broken == Some(true) {
            return true;
        }
        match (self.durability, self.max_durability) {
            (Some(durability), Some(max)) if max > 0 => {
                durability.saturating_mul(100) < max.saturating_mul(threshold_percent)
            }
            _ => false,
        }
    }
}

/// A live entity as reported by a zone state read.
///
/// Only `entity_id` is required; the world is free to omit anything else and
/// routinely does for entities outside the reader's interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEntity {
    pub entity_id: String,
    #[serde(default)]
    pub kind: EntityKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub hp: Option<i64>,
    #[serde(default)]
    pub max_hp: Option<i64>,
    #[serde(default)]
    pub alive: Option<bool>,
    #[serde(default)]
    pub resource_kind: Option<ResourceKind>,
    #[serde(default)]
    pub station_kind: Option<StationKind>,
    #[serde(default)]
    pub services: Vec<NpcService>,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    #[serde(default)]
    pub equipment: Vec<EquipmentPiece>,
    #[serde(default)]
    pub professions: Vec<Profession>,
}

impl WorldEntity {
    pub fn new(entity_id: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
            name: None,
            level: None,
            position: None,
            hp: None,
            max_hp: None,
            alive: None,
            resource_kind: None,
            station_kind: None,
            services: Vec::new(),
            inventory: Vec::new(),
            equipment: Vec::new(),
            professions: Vec::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.unwrap_or(true)
    }

    /// HP as a percentage of max HP, when both are known.
    pub fn hp_percent(&self) -> Option<u32> {
        match (self.hp, self.max_hp) {
            (Some(hp), Some(max)) if max > 0 => {
                let hp = hp.max(0) as u64;
                Some((hp.saturating_mul(100) / max as u64) as u32)
            }
            _ => None,
        }
    }

    pub fn equipped(&self, slot: EquipSlot) -> Option<&EquipmentPiece> {
        self.equipment
            .iter()
            .find(|piece| piece.slot == slot && piece.item_id.is_some())
    }

    pub fn has_item_kind(&self, kind: ItemKind) -> bool {
        self.inventory.iter().any(|item| item.kind == kind)
    }

    pub fn first_item_of_kind(&self, kind: ItemKind) -> Option<&InventoryItem> {
        self.inventory.iter().find(|item| item.kind == kind)
    }

    pub fn distance_to(&self, other: &WorldEntity) -> Option<f64> {
        match (&self.position, &other.position) {
            (Some(a), Some(b)) => Some(a.distance_to(b)),
            _ => None,
        }
    }
}

// ============================================================================
// Zones
// ============================================================================

/// Live entity population of one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneState {
    pub zone_id: String,
    #[serde(default)]
    pub entities: BTreeMap<String, WorldEntity>,
}

impl ZoneState {
    pub fn entity(&self, entity_id: &str) -> Option<&WorldEntity> {
        self.entities.get(entity_id)
    }
}

/// Full multi-zone snapshot. Used only for entity re-scan; everything else
/// reads single zones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldState {
    #[serde(default)]
    pub zones: BTreeMap<String, ZoneState>,
}

/// One edge in the zone adjacency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneNeighbor {
    pub zone_id: String,
    #[serde(default)]
    pub level_requirement: u32,
    /// Index in the world's mostly-linear zone chain, used as a travel
    /// heuristic. Absent when the world does not order this neighbor.
    #[serde(default)]
    pub order_index: Option<i64>,
}

/// Static zone metadata: entry requirement, chain position, adjacency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub zone_id: String,
    #[serde(default)]
    pub level_requirement: u32,
    #[serde(default)]
    pub order_index: Option<i64>,
    #[serde(default)]
    pub neighbors: Vec<ZoneNeighbor>,
}

// ============================================================================
// Domain action payloads
// ============================================================================

/// A quest as listed at the agent's current location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestInfo {
    pub quest_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub accepted: Option<bool>,
}

/// A recipe as listed by a crafting station catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeInfo {
    pub recipe_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Lower value means attempted earlier.
    #[serde(default)]
    pub priority: Option<u32>,
}

/// One purchasable listing at a merchant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopListing {
    pub listing_id: String,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slot: Option<EquipSlot>,
    #[serde(default)]
    pub price: Option<u64>,
}

/// Uniform result shape for world commands. A rejected command carries a
/// machine-readable reason code instead of an HTTP error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub ok: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl CommandOutcome {
    pub fn accepted() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }

    pub fn reason_is(&self, code: &str) -> bool {
        self.reason.as_deref() == Some(code)
    }
}

// ============================================================================
// Session authentication
// ============================================================================

/// Signature scheme accepted by the world's login endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    #[default]
    Ed25519,
}

/// Wallet-signature login proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAuthProof {
    #[serde(default)]
    pub scheme: AuthScheme,
    pub wallet: String,
    pub public_key: String,
    pub nonce: u64,
    pub signature: String,
}

/// Bearer session granted by the world after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    pub token: String,
    /// Unix seconds. Absent when the world leaves expiry to the client's
    /// own conservative default.
    #[serde(default)]
    pub expires_at: Option<u64>,
}
