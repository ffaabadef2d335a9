//! World API boundary: the thin HTTP request/response seam to the remote
//! simulation.
//!
//! Each call is one round trip. The client owns no retries and no caching;
//! resilience lives in the tick loop, not here. Command endpoints return a
//! [`CommandOutcome`] so a domain rejection (out of range, can't afford,
//! already accepted) stays distinguishable from a transport failure.

use agent_pilot_proto::{
    CommandOutcome, EntityRef, Position, Profession, QuestInfo, RecipeInfo, SessionAuthProof,
    SessionGrant, ShopListing, WorldState, ZoneInfo, ZoneState,
};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Rejection reason the questing routine tolerates as success.
pub const REASON_ALREADY_ACCEPTED: &str = "already_accepted";
/// Rejection reason the crafting chain silently skips past.
pub const REASON_MISSING_MATERIALS: &str = "missing_materials";
/// Rejection reason for purchases the wallet cannot cover.
pub const REASON_CANNOT_AFFORD: &str = "cannot_afford";

/// Remote world boundary consumed by the control loop.
///
/// Implementations must be callable from the pilot's loop thread; the HTTP
/// implementation and the in-memory fixture both are.
pub trait WorldApi: Send + Sync {
    // Session
    fn login(&self, proof: &SessionAuthProof) -> Result<SessionGrant, WorldApiError>;

    // Zone/world reads
    fn zone_state(&self, token: &str, zone_id: &str) -> Result<ZoneState, WorldApiError>;
    fn world_state(&self, token: &str) -> Result<WorldState, WorldApiError>;
    fn zone_info(&self, token: &str, zone_id: &str) -> Result<ZoneInfo, WorldApiError>;
    fn list_zones(&self, token: &str) -> Result<Vec<ZoneInfo>, WorldApiError>;

    // Movement and combat commands
    fn move_toward(
        &self,
        token: &str,
        actor: &EntityRef,
        target: Position,
    ) -> Result<CommandOutcome, WorldApiError>;
    fn attack(
        &self,
        token: &str,
        actor: &EntityRef,
        target_entity_id: &str,
    ) -> Result<CommandOutcome, WorldApiError>;
    fn travel(
        &self,
        token: &str,
        actor: &EntityRef,
        target_zone_id: &str,
    ) -> Result<CommandOutcome, WorldApiError>;

    // Domain actions
    fn available_quests(
        &self,
        token: &str,
        actor: &EntityRef,
    ) -> Result<Vec<QuestInfo>, WorldApiError>;
    fn accept_quest(
        &self,
        token: &str,
        actor: &EntityRef,
        quest_id: &str,
    ) -> Result<CommandOutcome, WorldApiError>;
    fn learn_profession(
        &self,
        token: &str,
        actor: &EntityRef,
        profession: Profession,
    ) -> Result<CommandOutcome, WorldApiError>;
    fn gather(
        &self,
        token: &str,
        actor: &EntityRef,
        node_entity_id: &str,
    ) -> Result<CommandOutcome, WorldApiError>;
    fn station_recipes(
        &self,
        token: &str,
        station_entity_id: &str,
    ) -> Result<Vec<RecipeInfo>, WorldApiError>;
    fn craft(
        &self,
        token: &str,
        actor: &EntityRef,
        station_entity_id: &str,
        recipe_id: &str,
    ) -> Result<CommandOutcome, WorldApiError>;
    fn consume_item(
        &self,
        token: &str,
        actor: &EntityRef,
        item_id: &str,
    ) -> Result<CommandOutcome, WorldApiError>;
    fn equip_item(
        &self,
        token: &str,
        actor: &EntityRef,
        item_id: &str,
    ) -> Result<CommandOutcome, WorldApiError>;
    fn repair_all(
        &self,
        token: &str,
        actor: &EntityRef,
        merchant_entity_id: &str,
    ) -> Result<CommandOutcome, WorldApiError>;
    fn shop_listings(
        &self,
        token: &str,
        merchant_entity_id: &str,
    ) -> Result<Vec<ShopListing>, WorldApiError>;
    fn buy_item(
        &self,
        token: &str,
        actor: &EntityRef,
        merchant_entity_id: &str,
        listing_id: &str,
    ) -> Result<CommandOutcome, WorldApiError>;
    fn gold_balance(&self, token: &str, wallet: &str) -> Result<u64, WorldApiError>;
    fn enchant(
        &self,
        token: &str,
        actor: &EntityRef,
        altar_entity_id: &str,
        item_id: &str,
    ) -> Result<CommandOutcome, WorldApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldApiError {
    BuildClient { message: String },
    Http { message: String },
    HttpStatus { code: u16, message: String },
    Decode { message: String },
}

impl fmt::Display for WorldApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldApiError::BuildClient { message } => write!(f, "client build failed: {message}"),
            WorldApiError::Http { message } => write!(f, "http request failed: {message}"),
            WorldApiError::HttpStatus { code, message } => {
                write!(f, "http status {code}: {message}")
            }
            WorldApiError::Decode { message } => write!(f, "decode response failed: {message}"),
        }
    }
}

impl Error for WorldApiError {}

// ============================================================================
// HTTP implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpWorldClient {
    base_url: String,
    client: Client,
}

impl HttpWorldClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, WorldApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| WorldApiError::BuildClient {
                message: err.to_string(),
            })?;
        let base_url = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get_json<T: DeserializeOwned>(&self, token: &str, path: &str) -> Result<T, WorldApiError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .map_err(|err| WorldApiError::Http {
                message: err.to_string(),
            })?;
        decode_response(response)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        token: Option<&str>,
        path: &str,
        body: &B,
    ) -> Result<T, WorldApiError> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().map_err(|err| WorldApiError::Http {
            message: err.to_string(),
        })?;
        decode_response(response)
    }

    fn actor_command<B: Serialize>(
        &self,
        token: &str,
        actor: &EntityRef,
        command: &str,
        body: &B,
    ) -> Result<CommandOutcome, WorldApiError> {
        let path = format!(
            "/zones/{}/entities/{}/commands/{}",
            actor.zone_id, actor.entity_id, command
        );
        self.post_json(Some(token), &path, body)
    }
}

fn decode_response<T: DeserializeOwned>(
    response: reqwest::blocking::Response,
) -> Result<T, WorldApiError> {
    let status = response.status();
    if status != StatusCode::OK {
        let message = response.text().unwrap_or_else(|_| "<no body>".to_string());
        return Err(WorldApiError::HttpStatus {
            code: status.as_u16(),
            message,
        });
    }
    response.json().map_err(|err| WorldApiError::Decode {
        message: err.to_string(),
    })
}

#[derive(Debug, Serialize)]
struct MoveBody {
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize)]
struct AttackBody<'a> {
    target_entity_id: &'a str,
}

#[derive(Debug, Serialize)]
struct TravelBody<'a> {
    target_zone_id: &'a str,
}

#[derive(Debug, Serialize)]
struct LearnProfessionBody {
    profession: Profession,
}

#[derive(Debug, Serialize)]
struct GatherBody<'a> {
    node_entity_id: &'a str,
}

#[derive(Debug, Serialize)]
struct CraftBody<'a> {
    station_entity_id: &'a str,
    recipe_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ItemBody<'a> {
    item_id: &'a str,
}

#[derive(Debug, Serialize)]
struct RepairBody<'a> {
    merchant_entity_id: &'a str,
}

#[derive(Debug, Serialize)]
struct BuyBody<'a> {
    merchant_entity_id: &'a str,
    listing_id: &'a str,
}

#[derive(Debug, Serialize)]
struct EnchantBody<'a> {
    altar_entity_id: &'a str,
    item_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    gold: u64,
}

#[derive(Debug, Serialize)]
struct EmptyBody {}

impl WorldApi for HttpWorldClient {
    fn login(&self, proof: &SessionAuthProof) -> Result<SessionGrant, WorldApiError> {
        self.post_json(None, "/session/login", proof)
    }

    fn zone_state(&self, token: &str, zone_id: &str) -> Result<ZoneState, WorldApiError> {
        self.get_json(token, &format!("/zones/{zone_id}/state"))
    }

    fn world_state(&self, token: &str) -> Result<WorldState, WorldApiError> {
        self.get_json(token, "/world/state")
    }

    fn zone_info(&self, token: &str, zone_id: &str) -> Result<ZoneInfo, WorldApiError> {
        self.get_json(token, &format!("/zones/{zone_id}/info"))
    }

    fn list_zones(&self, token: &str) -> Result<Vec<ZoneInfo>, WorldApiError> {
        self.get_json(token, "/zones")
    }

    fn move_toward(
        &self,
        token: &str,
        actor: &EntityRef,
        target: Position,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.actor_command(
            token,
            actor,
            "move",
            &MoveBody {
                x: target.x,
                y: target.y,
            },
        )
    }

    fn attack(
        &self,
        token: &str,
        actor: &EntityRef,
        target_entity_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.actor_command(token, actor, "attack", &AttackBody { target_entity_id })
    }

    fn travel(
        &self,
        token: &str,
        actor: &EntityRef,
        target_zone_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.actor_command(token, actor, "travel", &TravelBody { target_zone_id })
    }

    fn available_quests(
        &self,
        token: &str,
        actor: &EntityRef,
    ) -> Result<Vec<QuestInfo>, WorldApiError> {
        self.get_json(
            token,
            &format!(
                "/zones/{}/entities/{}/quests",
                actor.zone_id, actor.entity_id
            ),
        )
    }

    fn accept_quest(
        &self,
        token: &str,
        actor: &EntityRef,
        quest_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        let path = format!(
            "/zones/{}/entities/{}/quests/{}/accept",
            actor.zone_id, actor.entity_id, quest_id
        );
        self.post_json(Some(token), &path, &EmptyBody {})
    }

    fn learn_profession(
        &self,
        token: &str,
        actor: &EntityRef,
        profession: Profession,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.actor_command(
            token,
            actor,
            "learn-profession",
            &LearnProfessionBody { profession },
        )
    }

    fn gather(
        &self,
        token: &str,
        actor: &EntityRef,
        node_entity_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.actor_command(token, actor, "gather", &GatherBody { node_entity_id })
    }

    fn station_recipes(
        &self,
        token: &str,
        station_entity_id: &str,
    ) -> Result<Vec<RecipeInfo>, WorldApiError> {
        self.get_json(token, &format!("/stations/{station_entity_id}/recipes"))
    }

    fn craft(
        &self,
        token: &str,
        actor: &EntityRef,
        station_entity_id: &str,
        recipe_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.actor_command(
            token,
            actor,
            "craft",
            &CraftBody {
                station_entity_id,
                recipe_id,
            },
        )
    }

    fn consume_item(
        &self,
        token: &str,
        actor: &EntityRef,
        item_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.actor_command(token, actor, "consume", &ItemBody { item_id })
    }

    fn equip_item(
        &self,
        token: &str,
        actor: &EntityRef,
        item_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.actor_command(token, actor, "equip", &ItemBody { item_id })
    }

    fn repair_all(
        &self,
        token: &str,
        actor: &EntityRef,
        merchant_entity_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.actor_command(
            token,
            actor,
            "repair-all",
            &RepairBody { merchant_entity_id },
        )
    }

    fn shop_listings(
        &self,
        token: &str,
        merchant_entity_id: &str,
    ) -> Result<Vec<ShopListing>, WorldApiError> {
        self.get_json(token, &format!("/merchants/{merchant_entity_id}/listings"))
    }

    fn buy_item(
        &self,
        token: &str,
        actor: &EntityRef,
        merchant_entity_id: &str,
        listing_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.actor_command(
            token,
            actor,
            "buy",
            &BuyBody {
                merchant_entity_id,
                listing_id,
            },
        )
    }

    fn gold_balance(&self, token: &str, wallet: &str) -> Result<u64, WorldApiError> {
        let response: BalanceResponse =
            self.get_json(token, &format!("/wallets/{wallet}/balance"))?;
        Ok(response.gold)
    }

    fn enchant(
        &self,
        token: &str,
        actor: &EntityRef,
        altar_entity_id: &str,
        item_id: &str,
    ) -> Result<CommandOutcome, WorldApiError> {
        self.actor_command(
            token,
            actor,
            "enchant",
            &EnchantBody {
                altar_entity_id,
                item_id,
            },
        )
    }
}
