//! Session authentication lifecycle.
//!
//! One [`AuthSession`] per agent, owned by that agent's loop. The cached
//! bearer token is reused until it enters the pre-expiry refresh window,
//! then a fresh session is established through the custodial wallet. Every
//! failure in this path collapses to `false`; the scheduler decides whether
//! that is fatal based on loop phase.

use agent_pilot_proto::{AuthScheme, SessionAuthProof};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::signer::{sign_login_challenge, WalletSigner};
use crate::store::ConfigStore;
use crate::world::WorldApi;

/// A cached token is never used closer to expiry than this.
pub const TOKEN_REFRESH_WINDOW: Duration = Duration::from_secs(60 * 60);
/// Assumed session lifetime when the world does not state one.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(23 * 60 * 60);

/// The agent's authenticated identity. Owned exclusively by one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub owner_wallet: String,
    pub custodial_wallet: String,
    pub token: String,
    pub expires_at: SystemTime,
}

#[derive(Debug)]
pub struct AuthSession {
    owner: String,
    identity: Option<AgentIdentity>,
}

impl AuthSession {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            identity: None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.token.as_str())
    }

    pub fn identity(&self) -> Option<&AgentIdentity> {
        self.identity.as_ref()
    }

    pub fn custodial_wallet(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .map(|identity| identity.custodial_wallet.as_str())
    }

    /// Ensure a usable session exists at `now`.
    ///
    /// Returns `true` with a cached token still outside the refresh window
    /// without touching the network. Otherwise walks the full path: custodial
    /// wallet lookup, signing-material export, challenge signature, login.
    pub fn ensure_authenticated(
        &mut self,
        now: SystemTime,
        world: &dyn WorldApi,
        store: &dyn ConfigStore,
        signer: &dyn WalletSigner,
    ) -> bool {
        if let Some(identity) = &self.identity {
            if identity
                .expires_at
                .duration_since(now)
                .map(|remaining| remaining > TOKEN_REFRESH_WINDOW)
                .unwrap_or(false)
            {
                return true;
            }
        }

        let custodial_wallet = match store.custodial_wallet(&self.owner) {
            Ok(Some(wallet)) => wallet,
            Ok(None) | Err(_) => return false,
        };
        let material = match signer.export_signing_material(&custodial_wallet) {
            Ok(material) => material,
            Err(_) => return false,
        };

        let nonce = now
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        let (public_key, signature) = match sign_login_challenge(&material, nonce) {
            Ok(signed) => signed,
            Err(_) => return false,
        };

        let proof = SessionAuthProof {
            scheme: AuthScheme::Ed25519,
            wallet: custodial_wallet.clone(),
            public_key,
            nonce,
            signature,
        };
        let grant = match world.login(&proof) {
            Ok(grant) => grant,
            Err(_) => return false,
        };

        let expires_at = grant
            .expires_at
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap_or(now + DEFAULT_TOKEN_LIFETIME);
        self.identity = Some(AgentIdentity {
            owner_wallet: self.owner.clone(),
            custodial_wallet,
            token: grant.token,
            expires_at,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureWorld;
    use crate::signer::MockWalletSigner;
    use crate::store::InMemoryConfigStore;
    use agent_pilot_proto::AgentConfig;

    fn stores_with_wallet(owner: &str, wallet: &str) -> (InMemoryConfigStore, MockWalletSigner) {
        let store = InMemoryConfigStore::new();
        store.register_agent(
            owner,
            AgentConfig::default(),
            None,
            Some(wallet.to_string()),
        );
        let signer = MockWalletSigner::new();
        signer.register_wallet(wallet);
        (store, signer)
    }

    #[test]
    fn missing_custodial_wallet_fails_closed() {
        let world = FixtureWorld::new();
        let store = InMemoryConfigStore::new();
        store.register_agent("owner-1", AgentConfig::default(), None, None);
        let signer = MockWalletSigner::new();

        let mut session = AuthSession::new("owner-1");
        assert!(!session.ensure_authenticated(SystemTime::now(), &world, &store, &signer));
        assert!(session.token().is_none());
        assert_eq!(world.login_count(), 0);
    }

    #[test]
    fn fresh_token_is_cached_and_reused() {
        let world = FixtureWorld::new();
        let (store, signer) = stores_with_wallet("owner-1", "custodial-1");
        let now = SystemTime::now();

        let mut session = AuthSession::new("owner-1");
        assert!(session.ensure_authenticated(now, &world, &store, &signer));
        assert!(session.ensure_authenticated(now, &world, &store, &signer));
        assert_eq!(world.login_count(), 1, "second call must not hit the world");
    }

    #[test]
    fn token_inside_refresh_window_triggers_fresh_login() {
        let world = FixtureWorld::new();
        let (store, signer) = stores_with_wallet("owner-1", "custodial-1");
        let now = SystemTime::now();

        let mut session = AuthSession::new("owner-1");
        assert!(session.ensure_authenticated(now, &world, &store, &signer));
        assert_eq!(world.login_count(), 1);

        // Pretend the cached token is only 30 minutes from expiry.
        let later = session
            .identity()
            .map(|identity| identity.expires_at - Duration::from_secs(30 * 60))
            .expect("identity cached");
        assert!(session.ensure_authenticated(later, &world, &store, &signer));
        assert_eq!(world.login_count(), 2, "must re-authenticate in the window");
    }

    #[test]
    fn login_rejection_fails_closed() {
        let world = FixtureWorld::new();
        world.set_reject_login(true);
        let (store, signer) = stores_with_wallet("owner-1", "custodial-1");

        let mut session = AuthSession::new("owner-1");
        assert!(!session.ensure_authenticated(SystemTime::now(), &world, &store, &signer));
        assert!(session.token().is_none());
    }
}
