//! Custodial wallet signing.
//!
//! The pilot never holds long-lived keys of its own: it asks the external
//! wallet service for exportable signing material when a session must be
//! (re)established, signs the login challenge, and forgets the key.

use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt;

/// Exportable signing material for one custodial wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningMaterial {
    pub wallet: String,
    pub private_key_hex: String,
}

/// External wallet custodian boundary.
pub trait WalletSigner: Send + Sync {
    fn export_signing_material(&self, custodial_wallet: &str)
        -> Result<SigningMaterial, SignerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    UnknownWallet { wallet: String },
    KeyInvalid { message: String },
    Transport { message: String },
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerError::UnknownWallet { wallet } => write!(f, "unknown wallet: {wallet}"),
            SignerError::KeyInvalid { message } => write!(f, "invalid key material: {message}"),
            SignerError::Transport { message } => write!(f, "signer transport failed: {message}"),
        }
    }
}

impl Error for SignerError {}

/// Decode a 32-byte ed25519 private key from hex.
pub fn signing_key_from_hex(private_key_hex: &str) -> Result<SigningKey, SignerError> {
    let bytes = hex::decode(private_key_hex.trim()).map_err(|err| SignerError::KeyInvalid {
        message: err.to_string(),
    })?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| SignerError::KeyInvalid {
            message: format!("expected 32 bytes, got {}", bytes.len()),
        })?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Signed login challenge: digest of `<wallet>:<nonce>`, signed with the
/// custodial key. Returns `(public_key_hex, signature_hex)`.
pub fn sign_login_challenge(
    material: &SigningMaterial,
    nonce: u64,
) -> Result<(String, String), SignerError> {
    let signing_key = signing_key_from_hex(&material.private_key_hex)?;
    let mut hasher = Sha256::new();
    hasher.update(material.wallet.as_bytes());
    hasher.update(b":");
    hasher.update(nonce.to_string().as_bytes());
    let digest = hasher.finalize();
    let signature = signing_key.sign(&digest);
    let public_key = signing_key.verifying_key();
    Ok((
        hex::encode(public_key.to_bytes()),
        hex::encode(signature.to_bytes()),
    ))
}

/// HTTP wallet custodian client.
#[derive(Debug, Clone)]
pub struct HttpWalletSigner {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Debug, serde::Deserialize)]
struct ExportResponse {
    private_key_hex: String,
}

impl HttpWalletSigner {
    pub fn new(
        base_url: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, SignerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SignerError::Transport {
                message: err.to_string(),
            })?;
        let base_url = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl WalletSigner for HttpWalletSigner {
    fn export_signing_material(
        &self,
        custodial_wallet: &str,
    ) -> Result<SigningMaterial, SignerError> {
        let url = format!("{}/wallets/{}/export", self.base_url, custodial_wallet);
        let response = self
            .client
            .post(url)
            .send()
            .map_err(|err| SignerError::Transport {
                message: err.to_string(),
            })?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SignerError::UnknownWallet {
                wallet: custodial_wallet.to_string(),
            });
        }
        if status != reqwest::StatusCode::OK {
            return Err(SignerError::Transport {
                message: format!("http status {}", status.as_u16()),
            });
        }
        let body: ExportResponse = response.json().map_err(|err| SignerError::Transport {
            message: err.to_string(),
        })?;
        Ok(SigningMaterial {
            wallet: custodial_wallet.to_string(),
            private_key_hex: body.private_key_hex,
        })
    }
}

/// In-memory signer holding generated keys, for tests and local runs.
#[derive(Debug, Default)]
pub struct MockWalletSigner {
    keys: std::sync::Mutex<std::collections::BTreeMap<String, String>>,
}

impl MockWalletSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and register a fresh key for the wallet, returning the
    /// private key hex for out-of-band assertions.
    pub fn register_wallet(&self, wallet: impl Into<String>) -> String {
        let mut rng = rand_core::OsRng;
        let signing_key = SigningKey::generate(&mut rng);
        let private_key_hex = hex::encode(signing_key.to_bytes());
        let mut keys = self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        keys.insert(wallet.into(), private_key_hex.clone());
        private_key_hex
    }
}

impl WalletSigner for MockWalletSigner {
    fn export_signing_material(
        &self,
        custodial_wallet: &str,
    ) -> Result<SigningMaterial, SignerError> {
        let keys = self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match keys.get(custodial_wallet) {
            Some(private_key_hex) => Ok(SigningMaterial {
                wallet: custodial_wallet.to_string(),
                private_key_hex: private_key_hex.clone(),
            }),
            None => Err(SignerError::UnknownWallet {
                wallet: custodial_wallet.to_string(),
            }),
        }
    }
}
