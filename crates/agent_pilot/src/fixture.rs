//! In-memory world implementation for tests and local runs.
//!
//! Mirrors the shape of the remote world closely enough for the control loop
//! to run full ticks against it: zones hold entity maps, commands are
//! recorded rather than simulated, and individual command outcomes can be
//! scripted per call site.

use agent_pilot_proto::{
    CommandOutcome, EntityRef, Position, Profession, QuestInfo, RecipeInfo, SessionAuthProof,
    SessionGrant, ShopListing, WorldEntity, WorldState, ZoneInfo, ZoneState,
};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::world::{WorldApi, WorldApiError};

/// A command the fixture accepted, recorded for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum IssuedCommand {
    Move {
        entity_id: String,
        target: Position,
    },
    Attack {
        entity_id: String,
        target_entity_id: String,
    },
    Travel {
        entity_id: String,
        target_zone_id: String,
    },
    AcceptQuest {
        entity_id: String,
        quest_id: String,
    },
    LearnProfession {
        entity_id: String,
        profession: Profession,
    },
    Gather {
        entity_id: String,
        node_entity_id: String,
    },
    Craft {
        entity_id: String,
        station_entity_id: String,
        recipe_id: String,
    },
    Consume {
        entity_id: String,
        item_id: String,
    },
    Equip {
        entity_id: String,
        item_id: String,
    },
    RepairAll {
        entity_id: String,
        merchant_entity_id: String,
    },
    Buy {
        entity_id: String,
        merchant_entity_id: String,
        listing_id: String,
    },
    Enchant {
        entity_id: String,
        altar_entity_id: String,
        item_id: String,
    },
}

#[derive(Debug, Default)]
struct FixtureState {
    zones: BTreeMap<String, ZoneState>,
    zone_infos: BTreeMap<String, ZoneInfo>,
    quests: BTreeMap<String, Vec<QuestInfo>>,
    recipes: BTreeMap<String, Vec<RecipeInfo>>,
    listings: BTreeMap<String, Vec<ShopListing>>,
    gold: BTreeMap<String, u64>,
    craft_outcomes: BTreeMap<String, CommandOutcome>,
    quest_outcomes: BTreeMap<String, CommandOutcome>,
    buy_outcomes: BTreeMap<String, CommandOutcome>,
    commands: Vec<IssuedCommand>,
    logins: u64,
    reject_login: bool,
    fail_reads: bool,
}

/// Scriptable in-memory [`WorldApi`].
#[derive(Debug, Default)]
pub struct FixtureWorld {
    state: Mutex<FixtureState>,
}

impl FixtureWorld {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FixtureState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_zone(&self, info: ZoneInfo, entities: Vec<WorldEntity>) {
        let mut state = self.lock();
        let zone_id = info.zone_id.clone();
        let entities = entities
            .into_iter()
            .map(|entity| (entity.entity_id.clone(), entity))
            .collect();
        state.zones.insert(
            zone_id.clone(),
            ZoneState {
                zone_id: zone_id.clone(),
                entities,
            },
        );
        state.zone_infos.insert(zone_id, info);
    }

    pub fn upsert_entity(&self, zone_id: &str, entity: WorldEntity) {
        let mut state = self.lock();
        if let Some(zone) = state.zones.get_mut(zone_id) {
            zone.entities.insert(entity.entity_id.clone(), entity);
        }
    }

    pub fn remove_entity(&self, zone_id: &str, entity_id: &str) {
        let mut state = self.lock();
        if let Some(zone) = state.zones.get_mut(zone_id) {
            zone.entities.remove(entity_id);
        }
    }

    pub fn set_quests(&self, zone_id: impl Into<String>, quests: Vec<QuestInfo>) {
        self.lock().quests.insert(zone_id.into(), quests);
    }

    pub fn set_recipes(&self, station_entity_id: impl Into<String>, recipes: Vec<RecipeInfo>) {
        self.lock().recipes.insert(station_entity_id.into(), recipes);
    }

    pub fn set_listings(&self, merchant_entity_id: impl Into<String>, listings: Vec<ShopListing>) {
        self.lock()
            .listings
            .insert(merchant_entity_id.into(), listings);
    }

    pub fn set_gold(&self, wallet: impl Into<String>, amount: u64) {
        self.lock().gold.insert(wallet.into(), amount);
    }

    pub fn set_craft_outcome(&self, recipe_id: impl Into<String>, outcome: CommandOutcome) {
        self.lock().craft_outcomes.insert(recipe_id.into(), outcome);
    }

    pub fn set_quest_outcome(&self, quest_id: impl Into<String>, outcome: CommandOutcome) {
        self.lock().quest_outcomes.insert(quest_id.into(), outcome);
    }

    pub fn set_buy_outcome(&self, listing_id: impl Into<String>, outcome: CommandOutcome) {
        self.lock().buy_outcomes.insert(listing_id.into(), outcome);
    }

    pub fn set_reject_login(&self, reject: bool) {
        self.lock().reject_login = reject;
    }

    /// Make every read fail with a transport error, to exercise the loop's
    /// transient-failure path.
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn commands(&self) -> Vec<IssuedCommand> {
        self.lock().commands.clone()
    }

    pub fn login_count(&self) -> u64 {
        self.lock().logins
    }

    fn record(&self, command: IssuedCommand) -> Result<CommandOutcome, WorldApiError> {
        self.lock().commands.push(command);
        Ok(CommandOutcome::accepted())
    }

    fn check_reads(&self) -> Result<(), WorldApiError> {
        if self.lock().fail_reads {
            return Err(WorldApiError::Http {
                message: "fixture: reads disabled".to_string(),
            });
        }
        Ok(())
    }
}

impl WorldApi for FixtureWorld {
    fn login(&self, proof: &SessionAuthProof) -> Result<SessionGrant, WorldApiError> {
        let mut state = self.lock();
        state.logins += 1;
        if state.reject_login {
            return Err(WorldApiError::HttpStatus {
                code: 401,
                message: "signature rejected".to_string(),
            });
        }
        Ok(SessionGrant {
            token: format!("token-{}-{}", proof.wallet, state.logins),
            expires_at: None,
        })
    }

    fn zone_state(&self, _token: &str, zone_id: &str) -> Result<ZoneState, WorldApiError> {
        self.check_reads()?;
        self.lock()
            .zones
            .get(zone_id)
            .cloned()
            .ok_or_else(|| WorldApiError::HttpStatus {
                code: 404,
                message: format!("unknown zone: {zone_id}"),
            })
    }

    fn world_state(&self, _token: &str) -> Result<WorldState, WorldApiError> {
        self.check_reads()?;
        Ok(WorldState {
            zones: self.lock().zones.clone(),
        })
    }

    fn zone_info(&self, _token: &str, zone_id: &str) -> Result<ZoneInfo, WorldApiError> {
        self.check_reads()?;
        self.lock()
            .zone_infos
            .get(zone_id)
            .cloned()
            .ok_or_else(|| WorldApiError::HttpStatus {
                code: 404,
                message: format!("unknown zone: {zone_id}"),
            })
    }

    fn list_zones(&self, _token: &str) -> Result<Vec<ZoneInfo>, WorldApiError> {
        self.check_reads()?;
        Ok(self.lock().zone_infos.values().cloned().collect())
    }

    fn move_toward(
        &self,
        _token: &str,
        actor: &EntityRef,
        target: Position,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.record(IssuedCommand::Move {
            entity_id: actor.entity_id.clone(),
            target,
        })
    }

    fn attack(
        &self,
        _token: &str,
        actor: &EntityRef,
        target_entity_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.record(IssuedCommand::Attack {
            entity_id: actor.entity_id.clone(),
            target_entity_id: target_entity_id.to_string(),
        })
    }

    fn travel(
        &self,
        _token: &str,
        actor: &EntityRef,
        target_zone_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.record(IssuedCommand::Travel {
            entity_id: actor.entity_id.clone(),
            target_zone_id: target_zone_id.to_string(),
        })
    }

    fn available_quests(
        &self,
        _token: &str,
        actor: &EntityRef,
    ) -> Result<Vec<QuestInfo>, WorldApiError> {
        self.check_reads()?;
        Ok(self
            .lock()
            .quests
            .get(&actor.zone_id)
            .cloned()
            .unwrap_or_default())
    }

    fn accept_quest(
        &self,
        _token: &str,
        actor: &EntityRef,
        quest_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        let outcome = self
            .lock()
            .quest_outcomes
            .get(quest_id)
            .cloned()
            .unwrap_or_else(CommandOutcome::accepted);
        self.lock().commands.push(IssuedCommand::AcceptQuest {
            entity_id: actor.entity_id.clone(),
            quest_id: quest_id.to_string(),
        });
        Ok(outcome)
    }

    fn learn_profession(
        &self,
        _token: &str,
        actor: &EntityRef,
        profession: Profession,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.record(IssuedCommand::LearnProfession {
            entity_id: actor.entity_id.clone(),
            profession,
        })
    }

    fn gather(
        &self,
        _token: &str,
        actor: &EntityRef,
        node_entity_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.record(IssuedCommand::Gather {
            entity_id: actor.entity_id.clone(),
            node_entity_id: node_entity_id.to_string(),
        })
    }

    fn station_recipes(
        &self,
        _token: &str,
        station_entity_id: &str,
    ) -> Result<Vec<RecipeInfo>, WorldApiError> {
        self.check_reads()?;
        Ok(self
            .lock()
            .recipes
            .get(station_entity_id)
            .cloned()
            .unwrap_or_default())
    }

    fn craft(
        &self,
        _token: &str,
        actor: &EntityRef,
        station_entity_id: &str,
        recipe_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        let outcome = self
            .lock()
            .craft_outcomes
            .get(recipe_id)
            .cloned()
            .unwrap_or_else(CommandOutcome::accepted);
        self.lock().commands.push(IssuedCommand::Craft {
            entity_id: actor.entity_id.clone(),
            station_entity_id: station_entity_id.to_string(),
            recipe_id: recipe_id.to_string(),
        });
        Ok(outcome)
    }

    fn consume_item(
        &self,
        _token: &str,
        actor: &EntityRef,
        item_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.record(IssuedCommand::Consume {
            entity_id: actor.entity_id.clone(),
            item_id: item_id.to_string(),
        })
    }

    fn equip_item(
        &self,
        _token: &str,
        actor: &EntityRef,
        item_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.record(IssuedCommand::Equip {
            entity_id: actor.entity_id.clone(),
            item_id: item_id.to_string(),
        })
    }

    fn repair_all(
        &self,
        _token: &str,
        actor: &EntityRef,
        merchant_entity_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.record(IssuedCommand::RepairAll {
            entity_id: actor.entity_id.clone(),
            merchant_entity_id: merchant_entity_id.to_string(),
        })
    }

    fn shop_listings(
        &self,
        _token: &str,
        merchant_entity_id: &str,
    ) -> Result<Vec<ShopListing>, WorldApiError> {
        self.check_reads()?;
        Ok(self
            .lock()
            .listings
            .get(merchant_entity_id)
            .cloned()
            .unwrap_or_default())
    }

    fn buy_item(
        &self,
        _token: &str,
        actor: &EntityRef,
        merchant_entity_id: &str,
        listing_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        let outcome = self
            .lock()
            .buy_outcomes
            .get(listing_id)
            .cloned()
            .unwrap_or_else(CommandOutcome::accepted);
        self.lock().commands.push(IssuedCommand::Buy {
            entity_id: actor.entity_id.clone(),
            merchant_entity_id: merchant_entity_id.to_string(),
            listing_id: listing_id.to_string(),
        });
        Ok(outcome)
    }

    fn gold_balance(&self, _token: &str, wallet: &str) -> Result<u64, WorldApiError> {
        self.check_reads()?;
        Ok(self.lock().gold.get(wallet).copied().unwrap_or(0))
    }

    fn enchant(
        &self,
        _token: &str,
        actor: &EntityRef,
        altar_entity_id: &str,
        item_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.record(IssuedCommand::Enchant {
            entity_id: actor.entity_id.clone(),
            altar_entity_id: altar_entity_id.to_string(),
            item_id: item_id.to_string(),
        })
    }
}
