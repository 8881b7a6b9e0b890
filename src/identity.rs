//! Node identity: one secp256k1 key pins the node's address, one
//! HKDF-derived Ed25519 key does the actual signing.
//!
//! Key hierarchy: secp256k1 seed --HKDF-SHA256--> Ed25519 signing key.
//! `node_id` is derived from the secp256k1 public key so it's stable
//! across re-signs and doesn't depend on the Ed25519 key at all.
//!
//! At rest, the private key material is encrypted with AES-256-GCM under
//! a key stretched from an operator password via PBKDF2-HMAC-SHA256
//! (480,000 iterations, matching OWASP's current minimum). Running
//! without a password is only permitted when `ENGINE_DEV_MODE=1` is set,
//! and the saved file is flagged accordingly.

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use k256::SecretKey as Secp256k1SecretKey;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

const PBKDF2_ITERATIONS: u32 = 480_000;
const HKDF_INFO: &[u8] = b"sovereign-engine-ed25519-signing-key-v1";
const DEV_MODE_ENV: &str = "ENGINE_DEV_MODE";
const MASTER_PASSWORD_ENV: &str = "ENGINE_MASTER_PASSWORD";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse identity file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported identity alg {0:?}")]
    UnsupportedAlg(String),
    #[error("refusing to save an unencrypted identity without {MASTER_PASSWORD_ENV} or {DEV_MODE_ENV}=1")]
    RefusingPlaintextSave,
    #[error("missing {MASTER_PASSWORD_ENV} to decrypt an encrypted identity")]
    MissingPassword,
    #[error("invalid password or corrupted identity file")]
    DecryptionFailed,
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Kdf {
    name: String,
    iterations: u32,
    salt_b64: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdentityFile {
    node_id: String,
    created_at: String,
    public_key: String,
    alg: String,
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    secp256k1_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_key_enc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce_b64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kdf: Option<Kdf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

/// A node's signing identity. The Ed25519 private key lives in memory
/// only for the life of the process; `save`/`load` are the only places
/// that touch disk, and they always go through encryption unless the
/// operator has explicitly opted into dev mode.
pub struct NodeIdentity {
    pub node_id: String,
    pub created_at: String,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl NodeIdentity {
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.to_bytes())
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.signing_key.sign(data).to_bytes().to_vec()
    }

    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
            return false;
        };
        let sig = Signature::from_bytes(&bytes);
        self.verifying_key.verify(data, &sig).is_ok()
    }

    /// Generates a fresh identity. `secp256k1_seed`, when provided
    /// (e.g. from an operator-controlled vanity-address key), makes the
    /// derived Ed25519 key and `node_id` deterministic; otherwise a
    /// random secp256k1 key is minted for this process.
    pub fn generate(secp256k1_seed: Option<&[u8]>) -> Result<Self, IdentityError> {
        let mut rng = rand::thread_rng();
        let seed_bytes: Zeroizing<Vec<u8>> = match secp256k1_seed {
            Some(seed) => Zeroizing::new(seed.to_vec()),
            None => {
                let secret = Secp256k1SecretKey::random(&mut rng);
                Zeroizing::new(secret.to_bytes().to_vec())
            }
        };
        let secp_secret = Secp256k1SecretKey::from_slice(&seed_bytes)
            .map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        let secp_public = secp_secret.public_key();
        let node_id = format!("node-{}", &hex::encode(secp_public.to_sec1_bytes())[..8]);

        let hk = Hkdf::<Sha256>::new(None, &seed_bytes);
        let mut derived = Zeroizing::new([0u8; 32]);
        hk.expand(HKDF_INFO, &mut *derived)
            .map_err(|e| IdentityError::InvalidKey(e.to_string()))?;

        let signing_key = SigningKey::from_bytes(&derived);
        let verifying_key = signing_key.verifying_key();

        Ok(NodeIdentity {
            node_id,
            created_at: crate::time::utc_now().to_rfc3339(),
            signing_key,
            verifying_key,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), IdentityError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IdentityError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        }

        let password = std::env::var(MASTER_PASSWORD_ENV).ok();
        let blob = match password {
            Some(pw) => {
                let mut salt = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut salt);
                let key = derive_aes_key(&pw, &salt);
                let cipher = Aes256Gcm::new((&key).into());
                let mut nonce_bytes = [0u8; 12];
                rand::thread_rng().fill_bytes(&mut nonce_bytes);
                let nonce = Nonce::from_slice(&nonce_bytes);
                let ciphertext = cipher
                    .encrypt(nonce, self.signing_key.to_bytes().as_slice())
                    .map_err(|_| IdentityError::InvalidKey("aes-gcm encryption failed".to_string()))?;

                IdentityFile {
                    node_id: self.node_id.clone(),
                    created_at: self.created_at.clone(),
                    public_key: self.public_key_hex(),
                    alg: "ed25519".to_string(),
                    version: 1,
                    secp256k1_address: None,
                    private_key_enc: Some(BASE64.encode(ciphertext)),
                    nonce_b64: Some(BASE64.encode(nonce_bytes)),
                    kdf: Some(Kdf {
                        name: "pbkdf2_hmac_sha256".to_string(),
                        iterations: PBKDF2_ITERATIONS,
                        salt_b64: BASE64.encode(salt),
                    }),
                    private_key: None,
                    warning: None,
                }
            }
            None => {
                let dev_mode = std::env::var(DEV_MODE_ENV)
                    .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false);
                if !dev_mode {
                    return Err(IdentityError::RefusingPlaintextSave);
                }
                IdentityFile {
                    node_id: self.node_id.clone(),
                    created_at: self.created_at.clone(),
                    public_key: self.public_key_hex(),
                    alg: "ed25519".to_string(),
                    version: 1,
                    secp256k1_address: None,
                    private_key_enc: None,
                    nonce_b64: None,
                    kdf: None,
                    private_key: Some(hex::encode(self.signing_key.to_bytes())),
                    warning: Some("development mode: identity private key stored unencrypted".to_string()),
                }
            }
        };

        let json = serde_json::to_string_pretty(&blob).map_err(|e| IdentityError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| IdentityError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(path) {
                let mut perms = metadata.permissions();
                perms.set_mode(0o600);
                let _ = std::fs::set_permissions(path, perms);
            }
        }

        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let raw = std::fs::read_to_string(path).map_err(|e| IdentityError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let blob: IdentityFile = serde_json::from_str(&raw).map_err(|e| IdentityError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        if blob.alg != "ed25519" {
            return Err(IdentityError::UnsupportedAlg(blob.alg));
        }

        let priv_bytes: Vec<u8> = if let Some(enc) = &blob.private_key_enc {
            let kdf = blob.kdf.as_ref().ok_or(IdentityError::DecryptionFailed)?;
            let password = std::env::var(MASTER_PASSWORD_ENV).map_err(|_| IdentityError::MissingPassword)?;
            let salt = BASE64.decode(&kdf.salt_b64).map_err(|_| IdentityError::DecryptionFailed)?;
            let key = derive_aes_key(&password, &salt);
            let cipher = Aes256Gcm::new((&key).into());
            let nonce_bytes = BASE64
                .decode(blob.nonce_b64.as_deref().ok_or(IdentityError::DecryptionFailed)?)
                .map_err(|_| IdentityError::DecryptionFailed)?;
            let nonce = Nonce::from_slice(&nonce_bytes);
            let ciphertext = BASE64.decode(enc).map_err(|_| IdentityError::DecryptionFailed)?;
            cipher
                .decrypt(nonce, ciphertext.as_slice())
                .map_err(|_| IdentityError::DecryptionFailed)?
        } else {
            let hex_str = blob.private_key.as_deref().ok_or(IdentityError::DecryptionFailed)?;
            hex::decode(hex_str).map_err(|_| IdentityError::DecryptionFailed)?
        };

        let priv_array: [u8; 32] = priv_bytes
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::InvalidKey("private key is not 32 bytes".to_string()))?;
        let signing_key = SigningKey::from_bytes(&priv_array);
        let verifying_key = signing_key.verifying_key();

        Ok(NodeIdentity {
            node_id: blob.node_id,
            created_at: blob.created_at,
            signing_key,
            verifying_key,
        })
    }
}

fn derive_aes_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Loads the identity at `path`, generating and persisting a fresh one
/// if it doesn't exist yet.
pub fn ensure_identity(path: &Path) -> Result<NodeIdentity, IdentityError> {
    if path.exists() {
        return NodeIdentity::load(path);
    }
    let identity = NodeIdentity::generate(None)?;
    identity.save(path)?;
    Ok(identity)
}

pub fn default_identity_path(base: &str) -> PathBuf {
    PathBuf::from(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trips() {
        let identity = NodeIdentity::generate(None).unwrap();
        let sig = identity.sign(b"hello");
        assert!(identity.verify(b"hello", &sig));
        assert!(!identity.verify(b"goodbye", &sig));
    }

    #[test]
    fn same_seed_derives_the_same_keys_and_node_id() {
        let seed = [7u8; 32];
        let a = NodeIdentity::generate(Some(&seed)).unwrap();
        let b = NodeIdentity::generate(Some(&seed)).unwrap();
        assert_eq!(a.node_id, b.node_id);
        assert_eq!(a.public_key_hex(), b.public_key_hex());
    }

    #[test]
    fn save_without_password_or_dev_mode_is_refused() {
        std::env::remove_var(MASTER_PASSWORD_ENV);
        std::env::remove_var(DEV_MODE_ENV);
        let identity = NodeIdentity::generate(None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        assert!(matches!(identity.save(&path), Err(IdentityError::RefusingPlaintextSave)));
    }

    #[test]
    fn dev_mode_round_trips_through_disk() {
        std::env::remove_var(MASTER_PASSWORD_ENV);
        std::env::set_var(DEV_MODE_ENV, "1");
        let identity = NodeIdentity::generate(None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        identity.save(&path).unwrap();
        let loaded = NodeIdentity::load(&path).unwrap();
        assert_eq!(loaded.node_id, identity.node_id);
        assert_eq!(loaded.public_key_hex(), identity.public_key_hex());
        std::env::remove_var(DEV_MODE_ENV);
    }

    #[test]
    fn encrypted_round_trip_requires_the_password() {
        std::env::set_var(MASTER_PASSWORD_ENV, "correct horse battery staple");
        let identity = NodeIdentity::generate(None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        identity.save(&path).unwrap();

        let loaded = NodeIdentity::load(&path).unwrap();
        assert_eq!(loaded.public_key_hex(), identity.public_key_hex());

        std::env::set_var(MASTER_PASSWORD_ENV, "wrong password");
        assert!(matches!(NodeIdentity::load(&path), Err(IdentityError::DecryptionFailed)));
        std::env::remove_var(MASTER_PASSWORD_ENV);
    }
}
