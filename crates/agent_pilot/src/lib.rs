pub mod auth;
pub mod backoff;
pub mod behavior;
pub mod context;
pub mod fixture;
pub mod interrupt;
pub mod locator;
pub mod pilot;
pub mod settings;
pub mod signer;
pub mod store;
pub mod world;

pub use auth::{AgentIdentity, AuthSession, DEFAULT_TOKEN_LIFETIME, TOKEN_REFRESH_WINDOW};
pub use backoff::BackoffPolicy;
pub use behavior::{next_hop_toward, run_focus_behavior, PilotAction};
pub use context::{
    StrategyProfile, TickContext, ADAPTATION_INTERVAL_TICKS, ENGAGEMENT_RANGE,
    LOW_SUPPLIES_HP_PERCENT, OVERLEVEL_MARGIN, REPAIR_DURABILITY_PERCENT,
    SHOPPING_GOLD_THRESHOLD,
};
pub use fixture::{FixtureWorld, IssuedCommand};
pub use interrupt::{
    gear_repair, low_hp_response, self_adaptation, FocusOverride, LowHpOutcome, RepairAttempt,
};
pub use locator::EntityLocator;
pub use pilot::{
    AgentPilot, PilotError, PilotLogEntry, PilotLogKind, PilotMetrics, TickPhase,
    PILOT_LOG_CAPACITY,
};
pub use settings::{PilotSettings, SettingsError, DEFAULT_CONFIG_FILE_NAME, SAFE_RALLY_POINT};
pub use signer::{
    sign_login_challenge, signing_key_from_hex, HttpWalletSigner, MockWalletSigner, SignerError,
    SigningMaterial, WalletSigner,
};
pub use store::{ConfigStore, HttpConfigStore, InMemoryConfigStore, StoreError};
pub use world::{
    HttpWorldClient, WorldApi, WorldApiError, REASON_ALREADY_ACCEPTED, REASON_CANNOT_AFFORD,
    REASON_MISSING_MATERIALS,
};
