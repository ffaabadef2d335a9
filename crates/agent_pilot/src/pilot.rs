//! The behavior scheduler: one agent's tick loop and its lifecycle.
//!
//! Each [`AgentPilot`] owns exactly one loop thread. A tick runs
//! config → auth → locate → read → interrupts → focus behavior → sleep.
//! Before the first fully successful tick any phase failure is fatal and
//! rejects the start contract; after it, the same failures are absorbed with
//! a backoff sleep and the loop keeps going. `stop()` is cooperative and
//! observed at the top of the next iteration.

use agent_pilot_proto::{
    ActivityLogEntry, AgentConfigPatch, CommandOutcome, EntityRef, Focus, Profession,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::AuthSession;
use crate::behavior::{run_focus_behavior, PilotAction};
use crate::context::{StrategyProfile, TickContext};
use crate::interrupt::{gear_repair, low_hp_response, self_adaptation};
use crate::locator::EntityLocator;
use crate::settings::PilotSettings;
use crate::signer::{HttpWalletSigner, SignerError, WalletSigner};
use crate::store::{ConfigStore, HttpConfigStore, StoreError};
use crate::world::{HttpWorldClient, WorldApi, WorldApiError};

/// Bounded size of the in-memory pilot log.
pub const PILOT_LOG_CAPACITY: usize = 256;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PilotError {
    AlreadyRunning,
    Disabled,
    AuthFailed,
    EntityUnresolved,
    EntityStateUnreadable,
    SpawnFailed { message: String },
    StartChannelClosed,
    Store(StoreError),
    World(WorldApiError),
    Signer(SignerError),
}

impl fmt::Display for PilotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PilotError::AlreadyRunning => write!(f, "pilot already running"),
            PilotError::Disabled => write!(f, "agent config disabled"),
            PilotError::AuthFailed => write!(f, "authentication failed"),
            PilotError::EntityUnresolved => write!(f, "entity not found in any zone"),
            PilotError::EntityStateUnreadable => write!(f, "entity state unreadable"),
            PilotError::SpawnFailed { message } => write!(f, "loop spawn failed: {message}"),
            PilotError::StartChannelClosed => write!(f, "first-tick channel closed"),
            PilotError::Store(err) => write!(f, "config store: {err}"),
            PilotError::World(err) => write!(f, "world api: {err}"),
            PilotError::Signer(err) => write!(f, "wallet signer: {err}"),
        }
    }
}

impl Error for PilotError {}

impl From<StoreError> for PilotError {
    fn from(err: StoreError) -> Self {
        PilotError::Store(err)
    }
}

impl From<WorldApiError> for PilotError {
    fn from(err: WorldApiError) -> Self {
        PilotError::World(err)
    }
}

// ============================================================================
// Log and metrics
// ============================================================================

/// Loop phase a failure was classified under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPhase {
    Config,
    Auth,
    Locate,
    ReadState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PilotLogEntry {
    pub tick: u64,
    pub timestamp: u64,
    pub kind: PilotLogKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PilotLogKind {
    FirstTickSucceeded,
    FirstTickFailed { reason: String },
    PhaseFailed { phase: TickPhase, reason: String },
    BackoffWait { delay_ms: u64 },
    HealingConsumed { item_id: String },
    Fled,
    RepairRun { merchant_entity_id: Option<String> },
    FocusOverride {
        from: Focus,
        to: Focus,
        target_zone: Option<String>,
    },
    ActionExecuted { focus: Focus, action: PilotAction },
    Disabled,
    Stopped,
    DirectAction { description: String },
}

/// Counters for one pilot's lifetime, snapshotted on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PilotMetrics {
    pub total_ticks: u64,
    pub actions_executed: u64,
    pub interrupts_consumed: u64,
    pub focus_overrides: u64,
    pub transient_failures: u64,
}

#[derive(Debug)]
struct PilotShared {
    running: AtomicBool,
    stop: AtomicBool,
    log: Mutex<VecDeque<PilotLogEntry>>,
    metrics: Mutex<PilotMetrics>,
}

impl PilotShared {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            log: Mutex::new(VecDeque::new()),
            metrics: Mutex::new(PilotMetrics::default()),
        }
    }

    fn push_log(&self, tick: u64, kind: PilotLogKind) {
        let mut log = self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if log.len() == PILOT_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(PilotLogEntry {
            tick,
            timestamp: unix_now(),
            kind,
        });
    }

    fn metrics(&self) -> PilotMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn update_metrics(&self, update: impl FnOnce(&mut PilotMetrics)) -> PilotMetrics {
        let mut metrics = self
            .metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        update(&mut metrics);
        metrics.clone()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

// ============================================================================
// Runner state
// ============================================================================

/// Per-loop mutable state. Created at start, mutated only by the loop's own
/// tick, discarded when the loop stops.
#[derive(Debug, Default)]
struct RunnerState {
    ticks_since_focus_change: u64,
    last_focus: Option<Focus>,
    consecutive_failures: u32,
}

enum TickResult {
    Completed,
    Disabled,
    PhaseFailed { phase: TickPhase, error: PilotError },
}

// ============================================================================
// Agent pilot
// ============================================================================

pub struct AgentPilot {
    owner: String,
    settings: PilotSettings,
    world: Arc<dyn WorldApi>,
    store: Arc<dyn ConfigStore>,
    signer: Arc<dyn WalletSigner>,
    shared: Arc<PilotShared>,
    join_handle: Option<JoinHandle<()>>,
}

impl AgentPilot {
    pub fn new(
        owner: impl Into<String>,
        settings: PilotSettings,
        world: Arc<dyn WorldApi>,
        store: Arc<dyn ConfigStore>,
        signer: Arc<dyn WalletSigner>,
    ) -> Self {
        Self {
            owner: owner.into(),
            settings,
            world,
            store,
            signer,
            shared: Arc::new(PilotShared::new()),
            join_handle: None,
        }
    }

    /// Build a pilot wired to the HTTP boundary implementations.
    pub fn connect(owner: impl Into<String>, settings: PilotSettings) -> Result<Self, PilotError> {
        let world = HttpWorldClient::new(&settings.world_base_url, settings.request_timeout)?;
        let store = HttpConfigStore::new(&settings.store_base_url, settings.request_timeout)?;
        let signer = HttpWalletSigner::new(&settings.signer_base_url, settings.request_timeout)
            .map_err(PilotError::Signer)?;
        Ok(Self::new(
            owner,
            settings,
            Arc::new(world),
            Arc::new(store),
            Arc::new(signer),
        ))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> PilotMetrics {
        self.shared.metrics()
    }

    pub fn log_entries(&self) -> Vec<PilotLogEntry> {
        self.shared
            .log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Start the tick loop.
    ///
    /// With `wait_for_first_tick` the call blocks until the loop's first
    /// fully successful tick, surfacing any fatal startup condition as the
    /// error. Without it the call returns immediately and a first-tick
    /// failure is only recorded in the pilot log.
    pub fn start(&mut self, wait_for_first_tick: bool) -> Result<(), PilotError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(PilotError::AlreadyRunning);
        }
        self.shared.stop.store(false, Ordering::SeqCst);

        let (first_tick_tx, first_tick_rx) = mpsc::sync_channel::<Result<(), PilotError>>(1);
        let worker = LoopWorker {
            owner: self.owner.clone(),
            settings: self.settings.clone(),
            world: Arc::clone(&self.world),
            store: Arc::clone(&self.store),
            signer: Arc::clone(&self.signer),
            shared: Arc::clone(&self.shared),
        };

        let spawned = thread::Builder::new()
            .name(format!("agent-pilot-{}", self.owner))
            .spawn(move || worker.run(first_tick_tx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(PilotError::SpawnFailed {
                    message: err.to_string(),
                });
            }
        };
        self.join_handle = Some(handle);

        if wait_for_first_tick {
            match first_tick_rx.recv() {
                Ok(result) => result,
                Err(_) => Err(PilotError::StartChannelClosed),
            }
        } else {
            Ok(())
        }
    }

    /// Request a cooperative stop, observed at the top of the next tick.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    /// Wait for the loop thread to exit after a stop (or fatal condition).
    pub fn join(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }

    // ------------------------------------------------------------------
    // Direct actions, usable outside the tick loop
    // ------------------------------------------------------------------

    pub fn buy_item(
        &self,
        merchant_entity_id: &str,
        listing_id: &str,
    ) -> Result<CommandOutcome, PilotError> {
        self.with_session(
            format!("bought listing {listing_id}"),
            |world, token, entity_ref| world.buy_item(token, entity_ref, merchant_entity_id, listing_id),
        )
    }

    pub fn equip_item(&self, item_id: &str) -> Result<CommandOutcome, PilotError> {
        self.with_session(format!("equipped {item_id}"), |world, token, entity_ref| {
            world.equip_item(token, entity_ref, item_id)
        })
    }

    pub fn repair_gear(&self, merchant_entity_id: &str) -> Result<CommandOutcome, PilotError> {
        self.with_session(
            "repaired gear".to_string(),
            |world, token, entity_ref| world.repair_all(token, entity_ref, merchant_entity_id),
        )
    }

    pub fn learn_profession(&self, profession: Profession) -> Result<CommandOutcome, PilotError> {
        self.with_session(
            format!("learning profession {profession:?}"),
            |world, token, entity_ref| world.learn_profession(token, entity_ref, profession),
        )
    }

    fn with_session(
        &self,
        description: String,
        action: impl FnOnce(&dyn WorldApi, &str, &EntityRef) -> Result<CommandOutcome, WorldApiError>,
    ) -> Result<CommandOutcome, PilotError> {
        let mut auth = AuthSession::new(&self.owner);
        if !auth.ensure_authenticated(
            SystemTime::now(),
            self.world.as_ref(),
            self.store.as_ref(),
            self.signer.as_ref(),
        ) {
            return Err(PilotError::AuthFailed);
        }
        let token = auth.token().unwrap_or_default().to_string();

        let mut locator = EntityLocator::new(&self.owner);
        if !locator.ensure_entity_located(
            self.world.as_ref(),
            self.store.as_ref(),
            &token,
            unix_now(),
        ) {
            return Err(PilotError::EntityUnresolved);
        }
        let entity_ref = locator
            .current()
            .cloned()
            .ok_or(PilotError::EntityUnresolved)?;

        let outcome = action(self.world.as_ref(), &token, &entity_ref)?;
        if outcome.ok {
            let _ = self.store.append_activity(
                &self.owner,
                &ActivityLogEntry::activity(description.clone(), unix_now()),
            );
        }
        self.shared.push_log(
            self.shared.metrics().total_ticks,
            PilotLogKind::DirectAction { description },
        );
        Ok(outcome)
    }
}

// ============================================================================
// Loop worker
// ============================================================================

struct LoopWorker {
    owner: String,
    settings: PilotSettings,
    world: Arc<dyn WorldApi>,
    store: Arc<dyn ConfigStore>,
    signer: Arc<dyn WalletSigner>,
    shared: Arc<PilotShared>,
}

impl LoopWorker {
    fn run(self, first_tick_tx: SyncSender<Result<(), PilotError>>) {
        let mut first_tick_tx = Some(first_tick_tx);
        let mut auth = AuthSession::new(&self.owner);
        let mut locator = EntityLocator::new(&self.owner);
        let mut runner = RunnerState::default();

        loop {
            if self.shared.stop.load(Ordering::SeqCst) {
                let tick = self.shared.metrics().total_ticks;
                self.shared.push_log(tick, PilotLogKind::Stopped);
                break;
            }

            match self.run_tick(&mut auth, &mut locator, &mut runner, &mut first_tick_tx) {
                TickResult::Completed => {
                    runner.consecutive_failures = 0;
                    thread::sleep(self.settings.tick_interval);
                }
                TickResult::Disabled => {
                    let tick = self.shared.metrics().total_ticks;
                    self.shared.push_log(tick, PilotLogKind::Disabled);
                    if let Some(tx) = first_tick_tx.take() {
                        self.shared.push_log(
                            tick,
                            PilotLogKind::FirstTickFailed {
                                reason: PilotError::Disabled.to_string(),
                            },
                        );
                        let _ = tx.send(Err(PilotError::Disabled));
                    }
                    break;
                }
                TickResult::PhaseFailed { phase, error } => {
                    let tick = self.shared.metrics().total_ticks;
                    if let Some(tx) = first_tick_tx.take() {
                        // Before the first successful tick every phase
                        // failure is a failed deployment.
                        self.shared.push_log(
                            tick,
                            PilotLogKind::FirstTickFailed {
                                reason: error.to_string(),
                            },
                        );
                        let _ = tx.send(Err(error));
                        break;
                    }

                    runner.consecutive_failures = runner.consecutive_failures.saturating_add(1);
                    self.shared
                        .update_metrics(|metrics| metrics.transient_failures += 1);
                    self.shared.push_log(
                        tick,
                        PilotLogKind::PhaseFailed {
                            phase,
                            reason: error.to_string(),
                        },
                    );
                    let delay = self
                        .settings
                        .backoff
                        .delay_for(runner.consecutive_failures)
                        .max(self.settings.tick_interval);
                    self.shared.push_log(
                        tick,
                        PilotLogKind::BackoffWait {
                            delay_ms: delay.as_millis() as u64,
                        },
                    );
                    thread::sleep(delay);
                }
            }
        }

        self.shared.running.store(false, Ordering::SeqCst);
    }

    fn run_tick(
        &self,
        auth: &mut AuthSession,
        locator: &mut EntityLocator,
        runner: &mut RunnerState,
        first_tick_tx: &mut Option<SyncSender<Result<(), PilotError>>>,
    ) -> TickResult {
        let tick = self
            .shared
            .update_metrics(|metrics| metrics.total_ticks += 1)
            .total_ticks;

        // Re-read the goal state; it is never cached across ticks.
        let config = match self.store.agent_config(&self.owner) {
            Ok(config) => config,
            Err(err) => {
                return TickResult::PhaseFailed {
                    phase: TickPhase::Config,
                    error: PilotError::Store(err),
                }
            }
        };
        if !config.enabled {
            return TickResult::Disabled;
        }

        if !auth.ensure_authenticated(
            SystemTime::now(),
            self.world.as_ref(),
            self.store.as_ref(),
            self.signer.as_ref(),
        ) {
            return TickResult::PhaseFailed {
                phase: TickPhase::Auth,
                error: PilotError::AuthFailed,
            };
        }
        let token = auth.token().unwrap_or_default().to_string();
        let custodial_wallet = auth.custodial_wallet().unwrap_or_default().to_string();

        let now = unix_now();
        if !locator.ensure_entity_located(self.world.as_ref(), self.store.as_ref(), &token, now) {
            return TickResult::PhaseFailed {
                phase: TickPhase::Locate,
                error: PilotError::EntityUnresolved,
            };
        }
        let Some(entity_ref) = locator.current().cloned() else {
            return TickResult::PhaseFailed {
                phase: TickPhase::Locate,
                error: PilotError::EntityUnresolved,
            };
        };

        let zone = match self.world.zone_state(&token, &entity_ref.zone_id) {
            Ok(zone) => zone,
            Err(err) => {
                return TickResult::PhaseFailed {
                    phase: TickPhase::ReadState,
                    error: PilotError::World(err),
                }
            }
        };
        let Some(me) = zone.entity(&entity_ref.entity_id).cloned() else {
            // The ref was just validated, but the world can move the entity
            // between the two reads.
            return TickResult::PhaseFailed {
                phase: TickPhase::ReadState,
                error: PilotError::EntityStateUnreadable,
            };
        };

        // First successful full read resolves the start contract.
        if let Some(tx) = first_tick_tx.take() {
            self.shared.push_log(tick, PilotLogKind::FirstTickSucceeded);
            let _ = tx.send(Ok(()));
        }

        if runner.last_focus != Some(config.focus) {
            runner.last_focus = Some(config.focus);
            runner.ticks_since_focus_change = 0;
        } else {
            runner.ticks_since_focus_change = runner.ticks_since_focus_change.saturating_add(1);
        }

        let ctx = TickContext {
            world: self.world.as_ref(),
            store: self.store.as_ref(),
            token: &token,
            owner: &self.owner,
            custodial_wallet: &custodial_wallet,
            entity_ref: &entity_ref,
            me: &me,
            zone: &zone,
            config: &config,
            profile: StrategyProfile::for_strategy(config.strategy),
            rally_point: self.settings.rally_point,
            now,
        };

        // Interrupt 1: low HP.
        let low_hp = low_hp_response(&ctx);
        if low_hp.fled {
            self.shared.push_log(tick, PilotLogKind::Fled);
            let _ = self.store.append_activity(
                &self.owner,
                &ActivityLogEntry::activity("fled toward the rally point", now),
            );
        }
        if let Some(item_id) = low_hp.consumed_item {
            self.shared
                .update_metrics(|metrics| metrics.interrupts_consumed += 1);
            self.shared
                .push_log(tick, PilotLogKind::HealingConsumed { item_id });
            return TickResult::Completed;
        }

        // Interrupt 2: gear repair.
        if let Some(attempt) = gear_repair(&ctx) {
            self.shared
                .update_metrics(|metrics| metrics.interrupts_consumed += 1);
            self.shared.push_log(
                tick,
                PilotLogKind::RepairRun {
                    merchant_entity_id: attempt.merchant_entity_id,
                },
            );
            return TickResult::Completed;
        }

        // Interrupt 3: self-adaptation.
        if let Some(decision) = self_adaptation(&ctx, runner.ticks_since_focus_change) {
            let patch = match &decision.target_zone {
                Some(zone_id) => AgentConfigPatch::focus_with_target(decision.to, zone_id.clone()),
                None => AgentConfigPatch::focus(decision.to),
            };
            let _ = self.store.patch_agent_config(&self.owner, &patch);
            let _ = self.store.append_activity(
                &self.owner,
                &ActivityLogEntry::system(
                    format!("focus override: {} -> {}", decision.from, decision.to),
                    now,
                ),
            );
            self.shared.update_metrics(|metrics| {
                metrics.interrupts_consumed += 1;
                metrics.focus_overrides += 1;
            });
            self.shared.push_log(
                tick,
                PilotLogKind::FocusOverride {
                    from: decision.from,
                    to: decision.to,
                    target_zone: decision.target_zone,
                },
            );
            // The override takes effect next tick through the store.
            return TickResult::Completed;
        }

        if let Some(action) = run_focus_behavior(&ctx) {
            self.shared
                .update_metrics(|metrics| metrics.actions_executed += 1);
            self.shared.push_log(
                tick,
                PilotLogKind::ActionExecuted {
                    focus: config.focus,
                    action,
                },
            );
        }
        TickResult::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_buffer_is_bounded() {
        let shared = PilotShared::new();
        for _ in 0..(PILOT_LOG_CAPACITY + 10) {
            shared.push_log(0, PilotLogKind::Stopped);
        }
        let log = shared.log.lock().expect("lock");
        assert_eq!(log.len(), PILOT_LOG_CAPACITY);
    }

    #[test]
    fn metrics_update_returns_snapshot() {
        let shared = PilotShared::new();
        let snapshot = shared.update_metrics(|metrics| metrics.total_ticks += 1);
        assert_eq!(snapshot.total_ticks, 1);
        assert_eq!(shared.metrics().total_ticks, 1);
    }
}
