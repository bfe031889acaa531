//! API key generation and verification
//!
//! A client key is the base64 encoding of `{"k": secret, "n": name, "id": org_id}`.
//! Only a salted hash of the secret is stored.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::helpers::{constant_time_eq, random_token, sha256_hex};
use crate::types::OrgId;

const SECRET_LENGTH: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiKeyError {
    #[error("API key is not valid base64")]
    Encoding,

    #[error("API key payload is malformed")]
    Payload,
}

/// Decoded client key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedApiKey {
    #[serde(rename = "k")]
    pub secret: String,
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "id")]
    pub org_id: OrgId,
}

impl std::fmt::Debug for DecodedApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedApiKey")
            .field("name", &self.name)
            .field("org_id", &self.org_id)
            .finish_non_exhaustive()
    }
}

/// Freshly generated key: the client string is shown once, the hash is stored
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    pub client_secret: String,
    pub hashed_key: String,
}

/// Generate a new key for `name` in `org_id`
pub fn generate(org_id: OrgId, name: &str) -> GeneratedApiKey {
    let secret = random_token(SECRET_LENGTH);
    let hashed_key = hash_secret(name, &secret);
    let decoded = DecodedApiKey {
        secret,
        name: name.to_string(),
        org_id,
    };

    GeneratedApiKey {
        client_secret: encode(&decoded),
        hashed_key,
    }
}

#[must_use]
pub fn encode(key: &DecodedApiKey) -> String {
    // Serializing a struct of strings and an integer cannot fail
    let json = serde_json::to_vec(key).unwrap_or_default();
    STANDARD.encode(json)
}

pub fn decode(client_secret: &str) -> Result<DecodedApiKey, ApiKeyError> {
    let bytes = STANDARD
        .decode(client_secret.trim())
        .map_err(|_| ApiKeyError::Encoding)?;
    serde_json::from_slice(&bytes).map_err(|_| ApiKeyError::Payload)
}

#[must_use]
pub fn hash_secret(name: &str, secret: &str) -> String {
    sha256_hex(&[name, secret])
}

/// Check a decoded key against the stored hash in constant time
#[must_use]
pub fn is_valid(decoded: &DecodedApiKey, hashed_key: &str) -> bool {
    constant_time_eq(&hash_secret(&decoded.name, &decoded.secret), hashed_key)
}
