pub mod agent;
pub mod world;

pub use agent::{
    ActivityLogEntry, ActivityRole, AgentConfig, AgentConfigPatch, EntityRef, Focus, Strategy,
};
pub use world::{
    AuthScheme, CommandOutcome, EntityKind, EquipSlot, EquipmentPiece, InventoryItem, ItemKind,
    NpcService, Position, Profession, QuestInfo, RecipeInfo, ResourceKind, SessionAuthProof,
    SessionGrant, ShopListing, StationKind, WorldEntity, WorldState, ZoneInfo, ZoneNeighbor,
    ZoneState, EQUIPMENT_SLOTS,
};
