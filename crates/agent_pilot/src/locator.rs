//! Entity location self-healing.
//!
//! The cached `{entity_id, zone_id}` is a hint, not a fact: the world may
//! relocate the agent without notice. A hint that fails a single-zone read
//! forces a full multi-zone re-scan before any further action, and a found
//! correction is persisted so future ticks start from the right zone.

use agent_pilot_proto::{ActivityLogEntry, EntityRef};

use crate::store::ConfigStore;
use crate::world::WorldApi;

#[derive(Debug)]
pub struct EntityLocator {
    owner: String,
    current: Option<EntityRef>,
}

impl EntityLocator {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            current: None,
        }
    }

    /// The last confirmed location, if any.
    pub fn current(&self) -> Option<&EntityRef> {
        self.current.as_ref()
    }

    /// Confirm or re-resolve the agent's entity.
    ///
    /// Returns `false` only when the entity cannot be found in any zone (or
    /// no hint exists at all). A `true` return leaves `current()` set to a
    /// location that was live at the time of the read.
    pub fn ensure_entity_located(
        &mut self,
        world: &dyn WorldApi,
        store: &dyn ConfigStore,
        token: &str,
        now: u64,
    ) -> bool {
        let hint = match store.entity_ref(&self.owner) {
            Ok(Some(entity_ref)) => entity_ref,
            Ok(None) | Err(_) => {
                self.current = None;
                return false;
            }
        };

        if let Ok(zone) = world.zone_state(token, &hint.zone_id) {
            if zone.entity(&hint.entity_id).is_some() {
                self.current = Some(hint);
                return true;
            }
        }

        // Hint is stale: the world may have moved the entity. Scan everything.
        let state = match world.world_state(token) {
            Ok(state) => state,
            Err(_) => {
                self.current = None;
                return false;
            }
        };
        let found = state
            .zones
            .values()
            .find(|zone| zone.entity(&hint.entity_id).is_some());
        let Some(zone) = found else {
            self.current = None;
            return false;
        };

        let corrected = EntityRef {
            entity_id: hint.entity_id.clone(),
            zone_id: zone.zone_id.clone(),
        };
        if corrected.zone_id != hint.zone_id {
            let _ = store.set_entity_ref(&self.owner, &corrected);
            let _ = store.append_activity(
                &self.owner,
                &ActivityLogEntry::activity(
                    format!("relocated from {} to {}", hint.zone_id, corrected.zone_id),
                    now,
                ),
            );
        }
        self.current = Some(corrected);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureWorld;
    use crate::store::InMemoryConfigStore;
    use agent_pilot_proto::{AgentConfig, EntityKind, WorldEntity, ZoneInfo};

    fn entity(id: &str, kind: EntityKind) -> WorldEntity {
        WorldEntity::new(id, kind)
    }

    fn zone_info(id: &str) -> ZoneInfo {
        ZoneInfo {
            zone_id: id.to_string(),
            level_requirement: 0,
            order_index: None,
            neighbors: Vec::new(),
        }
    }

    fn store_with_ref(owner: &str, entity_ref: Option<EntityRef>) -> InMemoryConfigStore {
        let store = InMemoryConfigStore::new();
        store.register_agent(owner, AgentConfig::default(), entity_ref, None);
        store
    }

    #[test]
    fn confirms_entity_at_hinted_zone() {
        let world = FixtureWorld::new();
        world.add_zone(zone_info("zone-1"), vec![entity("e-1", EntityKind::Player)]);
        let store = store_with_ref(
            "owner-1",
            Some(EntityRef {
                entity_id: "e-1".to_string(),
                zone_id: "zone-1".to_string(),
            }),
        );

        let mut locator = EntityLocator::new("owner-1");
        assert!(locator.ensure_entity_located(&world, &store, "token", 0));
        assert_eq!(locator.current().map(|r| r.zone_id.as_str()), Some("zone-1"));
    }

    #[test]
    fn rescans_and_persists_when_world_relocated_entity() {
        let world = FixtureWorld::new();
        world.add_zone(zone_info("zone-1"), Vec::new());
        world.add_zone(zone_info("zone-2"), vec![entity("e-1", EntityKind::Player)]);
        let store = store_with_ref(
            "owner-1",
            Some(EntityRef {
                entity_id: "e-1".to_string(),
                zone_id: "zone-1".to_string(),
            }),
        );

        let mut locator = EntityLocator::new("owner-1");
        assert!(locator.ensure_entity_located(&world, &store, "token", 42));
        assert_eq!(locator.current().map(|r| r.zone_id.as_str()), Some("zone-2"));

        let persisted = store.entity_ref("owner-1").expect("read");
        assert_eq!(persisted.map(|r| r.zone_id), Some("zone-2".to_string()));

        let log = store.activity_log("owner-1");
        assert_eq!(log.len(), 1);
        assert!(log[0].text.contains("zone-1"));
        assert!(log[0].text.contains("zone-2"));
    }

    #[test]
    fn entity_found_nowhere_returns_false() {
        let world = FixtureWorld::new();
        world.add_zone(zone_info("zone-1"), Vec::new());
        let store = store_with_ref(
            "owner-1",
            Some(EntityRef {
                entity_id: "e-1".to_string(),
                zone_id: "zone-1".to_string(),
            }),
        );

        let mut locator = EntityLocator::new("owner-1");
        assert!(!locator.ensure_entity_located(&world, &store, "token", 0));
        assert!(locator.current().is_none());
    }

    #[test]
    fn missing_hint_returns_false() {
        let world = FixtureWorld::new();
        let store = store_with_ref("owner-1", None);

        let mut locator = EntityLocator::new("owner-1");
        assert!(!locator.ensure_entity_located(&world, &store, "token", 0));
    }
}
