//! Agent config store boundary.
//!
//! The store owns the per-agent goal state (`AgentConfig`), the cached
//! entity ref, the owner→custodial wallet mapping, and the append-only
//! activity log. The pilot reads the config every tick and writes back only
//! through patches, so an operator edit and a self-adaptation override merge
//! the same way.

use agent_pilot_proto::{ActivityLogEntry, AgentConfig, AgentConfigPatch, EntityRef};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

pub trait ConfigStore: Send + Sync {
    fn agent_config(&self, owner: &str) -> Result<AgentConfig, StoreError>;
    fn patch_agent_config(&self, owner: &str, patch: &AgentConfigPatch) -> Result<(), StoreError>;
    fn entity_ref(&self, owner: &str) -> Result<Option<EntityRef>, StoreError>;
    fn set_entity_ref(&self, owner: &str, entity_ref: &EntityRef) -> Result<(), StoreError>;
    fn custodial_wallet(&self, owner: &str) -> Result<Option<String>, StoreError>;
    fn append_activity(&self, owner: &str, entry: &ActivityLogEntry) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    BuildClient { message: String },
    Http { message: String },
    HttpStatus { code: u16, message: String },
    Decode { message: String },
    UnknownAgent { owner: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::BuildClient { message } => write!(f, "client build failed: {message}"),
            StoreError::Http { message } => write!(f, "http request failed: {message}"),
            StoreError::HttpStatus { code, message } => write!(f, "http status {code}: {message}"),
            StoreError::Decode { message } => write!(f, "decode response failed: {message}"),
            StoreError::UnknownAgent { owner } => write!(f, "unknown agent: {owner}"),
        }
    }
}

impl Error for StoreError {}

// ============================================================================
// HTTP implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpConfigStore {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct CustodialWalletResponse {
    #[serde(default)]
    custodial_wallet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntityRefResponse {
    #[serde(default)]
    entity_ref: Option<EntityRef>,
}

#[derive(Debug, Serialize)]
struct SetEntityRefBody<'a> {
    entity_ref: &'a EntityRef,
}

impl HttpConfigStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StoreError::BuildClient {
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

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .map_err(|err| StoreError::Http {
                message: err.to_string(),
            })?;
        decode_response(response)
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, StoreError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .map_err(|err| StoreError::Http {
                message: err.to_string(),
            })?;
        decode_response(response)
    }
}

fn decode_response<T: DeserializeOwned>(
    response: reqwest::blocking::Response,
) -> Result<T, StoreError> {
    let status = response.status();
    if status != StatusCode::OK {
        let message = response.text().unwrap_or_else(|_| "<no body>".to_string());
        return Err(StoreError::HttpStatus {
            code: status.as_u16(),
            message,
        });
    }
    response.json().map_err(|err| StoreError::Decode {
        message: err.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct Acknowledged {
    #[serde(default)]
    #[allow(dead_code)]
    ok: bool,
}

impl ConfigStore for HttpConfigStore {
    fn agent_config(&self, owner: &str) -> Result<AgentConfig, StoreError> {
        self.get_json(&format!("/agents/{owner}/config"))
    }

    fn patch_agent_config(&self, owner: &str, patch: &AgentConfigPatch) -> Result<(), StoreError> {
        let _: Acknowledged = self.post_json(&format!("/agents/{owner}/config"), patch)?;
        Ok(())
    }

    fn entity_ref(&self, owner: &str) -> Result<Option<EntityRef>, StoreError> {
        let response: EntityRefResponse = self.get_json(&format!("/agents/{owner}/entity-ref"))?;
        Ok(response.entity_ref)
    }

    fn set_entity_ref(&self, owner: &str, entity_ref: &EntityRef) -> Result<(), StoreError> {
        let _: Acknowledged = self.post_json(
            &format!("/agents/{owner}/entity-ref"),
            &SetEntityRefBody { entity_ref },
        )?;
        Ok(())
    }

    fn custodial_wallet(&self, owner: &str) -> Result<Option<String>, StoreError> {
        let response: CustodialWalletResponse =
            self.get_json(&format!("/agents/{owner}/custodial-wallet"))?;
        Ok(response.custodial_wallet)
    }

    fn append_activity(&self, owner: &str, entry: &ActivityLogEntry) -> Result<(), StoreError> {
        let _: Acknowledged = self.post_json(&format!("/agents/{owner}/activity"), entry)?;
        Ok(())
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Debug, Default)]
struct AgentRecord {
    config: AgentConfig,
    entity_ref: Option<EntityRef>,
    custodial_wallet: Option<String>,
    activity: Vec<ActivityLogEntry>,
}

/// In-memory store for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    agents: Mutex<BTreeMap<String, AgentRecord>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_agent(
        &self,
        owner: impl Into<String>,
        config: AgentConfig,
        entity_ref: Option<EntityRef>,
        custodial_wallet: Option<String>,
    ) {
        let mut agents = self.lock();
        agents.insert(
            owner.into(),
            AgentRecord {
                config,
                entity_ref,
                custodial_wallet,
                activity: Vec::new(),
            },
        );
    }

    pub fn activity_log(&self, owner: &str) -> Vec<ActivityLogEntry> {
        let agents = self.lock();
        agents
            .get(owner)
            .map(|record| record.activity.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, AgentRecord>> {
        self.agents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn agent_config(&self, owner: &str) -> Result<AgentConfig, StoreError> {
        let agents = self.lock();
        agents
            .get(owner)
            .map(|record| record.config.clone())
            .ok_or_else(|| StoreError::UnknownAgent {
                owner: owner.to_string(),
            })
    }

    fn patch_agent_config(&self, owner: &str, patch: &AgentConfigPatch) -> Result<(), StoreError> {
        let mut agents = self.lock();
        let record = agents
            .get_mut(owner)
            .ok_or_else(|| StoreError::UnknownAgent {
                owner: owner.to_string(),
            })?;
        patch.apply(&mut record.config);
        Ok(())
    }

    fn entity_ref(&self, owner: &str) -> Result<Option<EntityRef>, StoreError> {
        let agents = self.lock();
        agents
            .get(owner)
            .map(|record| record.entity_ref.clone())
            .ok_or_else(|| StoreError::UnknownAgent {
                owner: owner.to_string(),
            })
    }

    fn set_entity_ref(&self, owner: &str, entity_ref: &EntityRef) -> Result<(), StoreError> {
        let mut agents = self.lock();
        let record = agents
            .get_mut(owner)
            .ok_or_else(|| StoreError::UnknownAgent {
                owner: owner.to_string(),
            })?;
        record.entity_ref = Some(entity_ref.clone());
        Ok(())
    }

    fn custodial_wallet(&self, owner: &str) -> Result<Option<String>, StoreError> {
        let agents = self.lock();
        agents
            .get(owner)
            .map(|record| record.custodial_wallet.clone())
            .ok_or_else(|| StoreError::UnknownAgent {
                owner: owner.to_string(),
            })
    }

    fn append_activity(&self, owner: &str, entry: &ActivityLogEntry) -> Result<(), StoreError> {
        let mut agents = self.lock();
        let record = agents
            .get_mut(owner)
            .ok_or_else(|| StoreError::UnknownAgent {
                owner: owner.to_string(),
            })?;
        record.activity.push(entry.clone());
        Ok(())
    }
}
