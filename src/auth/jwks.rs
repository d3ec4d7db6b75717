// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Refresh discipline
//!
//! - A single async mutex guards both the staleness check and the fetch, so
//!   concurrent callers during a refresh wait for it instead of issuing their
//!   own request.
//! - The fetched document is fully parsed before it replaces the cached set.
//!   A failed or cancelled refresh leaves the previous set in place and does
//!   not push `stale_after` forward, so the next lookup retries.
//! - Lookups scan an `Arc` snapshot of the set after the lock is released.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let jwks = JwksManager::builder(jwks_endpoint("https://imas.example.com"))
//!     .ttl(Duration::from_secs(300))
//!     .build();
//! let key = jwks.resolve("key-1").await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::DecodingKey;
use rsa::{traits::PublicKeyParts, BigUint, RsaPublicKey};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::error::KeySourceError;

/// Default JWKS refresh interval (10 minutes).
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(600);

/// Default HTTP timeout for a JWKS fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Exponents are left-padded to this many bytes before big-endian decoding.
const EXPONENT_WIDTH: usize = 8;

/// Build the v1 JWKS endpoint URL for an identity service base URL.
pub fn jwks_endpoint(service_url: &str) -> String {
    format!("{}/v1/jwks", service_url.trim_end_matches('/'))
}

/// Resolves signing keys by key id.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn resolve(&self, kid: &str) -> Result<KeyEntry, KeySourceError>;
}

/// A single RSA verification key from the published set.
#[derive(Clone)]
pub struct KeyEntry {
    id: String,
    algorithm: String,
    modulus: BigUint,
    exponent: u64,
    decoding_key: DecodingKey,
}

impl KeyEntry {
    /// Build a key from the base64url (unpadded, big-endian) `n` and `e`
    /// members of a JWK.
    pub fn from_components(
        id: impl Into<String>,
        algorithm: impl Into<String>,
        n: &str,
        e: &str,
    ) -> Result<Self, KeySourceError> {
        let id = id.into();
        let invalid = |reason: String| KeySourceError::InvalidKey {
            kid: id.clone(),
            reason,
        };

        let modulus = decode_modulus(n).map_err(invalid)?;
        let exponent = decode_exponent(e).map_err(invalid)?;

        // Rejects degenerate moduli and exponents before they reach verification.
        let public = RsaPublicKey::new(modulus.clone(), BigUint::from(exponent))
            .map_err(|err| invalid(err.to_string()))?;
        let decoding_key =
            DecodingKey::from_rsa_raw_components(&public.n().to_bytes_be(), &public.e().to_bytes_be());

        Ok(Self {
            id,
            algorithm: algorithm.into(),
            modulus,
            exponent,
            decoding_key,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The JWA algorithm name the key is published for, e.g. `RS512`.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn exponent(&self) -> u64 {
        self.exponent
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("id", &self.id)
            .field("algorithm", &self.algorithm)
            .field("modulus_bits", &self.modulus.bits())
            .field("exponent", &self.exponent)
            .finish()
    }
}

fn decode_modulus(n: &str) -> Result<BigUint, String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(n)
        .map_err(|e| format!("modulus is not base64url: {e}"))?;
    if bytes.is_empty() {
        return Err("modulus is empty".to_string());
    }
    Ok(BigUint::from_bytes_be(&bytes))
}

fn decode_exponent(e: &str) -> Result<u64, String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(e)
        .map_err(|err| format!("exponent is not base64url: {err}"))?;
    if bytes.is_empty() {
        return Err("exponent is empty".to_string());
    }
    if bytes.len() > EXPONENT_WIDTH {
        return Err(format!("exponent is {} bytes, at most {EXPONENT_WIDTH} supported", bytes.len()));
    }

    let mut padded = [0u8; EXPONENT_WIDTH];
    padded[EXPONENT_WIDTH - bytes.len()..].copy_from_slice(&bytes);
    Ok(u64::from_be_bytes(padded))
}

/// Wire format of the JWKS document.
#[derive(Debug, Deserialize)]
struct JwksDocument {
    #[serde(default)]
    keys: Vec<RawJwk>,
    #[serde(default, rename = "keysMeta")]
    keys_meta: HashMap<String, KeyMetadata>,
    #[serde(default, rename = "maxTokenTTL")]
    max_token_ttl: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawJwk {
    #[serde(default)]
    kty: String,
    #[serde(default)]
    alg: String,
    #[serde(default)]
    kid: String,
    #[serde(default)]
    n: String,
    #[serde(default)]
    e: String,
}

#[derive(Debug, Deserialize)]
struct KeyMetadata {
    #[serde(default)]
    at: i64,
}

/// A parsed key set. Replaced wholesale on refresh, never mutated.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: Vec<KeyEntry>,
    published_at: HashMap<String, i64>,
    max_token_ttl: Option<Duration>,
}

impl KeySet {
    /// Parse a JWKS document.
    ///
    /// Keys of a type other than RSA are skipped, and so are RSA keys that do
    /// not decode; the remaining keys stay usable. Only a document that is not
    /// a key set at all is an error.
    pub fn from_json(body: &[u8]) -> Result<Self, KeySourceError> {
        let document: JwksDocument =
            serde_json::from_slice(body).map_err(|e| KeySourceError::Decode(e.to_string()))?;

        let mut keys = Vec::with_capacity(document.keys.len());
        for jwk in document.keys {
            if !jwk.kty.is_empty() && jwk.kty != "RSA" {
                debug!(kid = %jwk.kid, kty = %jwk.kty, "Skipping non-RSA key in JWKS");
                continue;
            }
            match KeyEntry::from_components(jwk.kid, jwk.alg, &jwk.n, &jwk.e) {
                Ok(key) => keys.push(key),
                Err(err) => warn!(error = %err, "Skipping undecodable key in JWKS"),
            }
        }

        Ok(Self {
            keys,
            published_at: document
                .keys_meta
                .into_iter()
                .map(|(kid, meta)| (kid, meta.at))
                .collect(),
            max_token_ttl: document.max_token_ttl.map(Duration::from_secs),
        })
    }

    /// Find a key by id. Duplicate ids resolve to the first occurrence.
    pub fn find(&self, kid: &str) -> Option<&KeyEntry> {
        self.keys.iter().find(|key| key.id == kid)
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|key| key.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Longest lifetime the issuer will give a token, if published.
    pub fn max_token_ttl(&self) -> Option<Duration> {
        self.max_token_ttl
    }

    /// Unix timestamp at which a key was published, if listed in `keysMeta`.
    pub fn published_at(&self, kid: &str) -> Option<i64> {
        self.published_at.get(kid).copied()
    }
}

/// JWKS cache entry state.
struct CacheState {
    keys: Option<Arc<KeySet>>,
    stale_after: DateTime<Utc>,
}

/// JWKS manager with caching.
///
/// Cloning shares the cache.
#[derive(Clone)]
pub struct JwksManager {
    /// JWKS URL
    endpoint: String,
    /// Refresh interval
    ttl: Duration,
    /// HTTP client
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
    cache: Arc<Mutex<CacheState>>,
}

impl fmt::Debug for JwksManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksManager")
            .field("endpoint", &self.endpoint)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Builder for [`JwksManager`].
pub struct JwksManagerBuilder {
    endpoint: String,
    ttl: Duration,
    timeout: Duration,
    client: Option<reqwest::Client>,
    clock: Arc<dyn Clock>,
}

impl JwksManagerBuilder {
    /// Change the refresh interval.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Timeout for the default HTTP client. Ignored when [`client`](Self::client) is set.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a preconfigured HTTP client (custom timeouts, proxies, retries).
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> JwksManager {
        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(self.timeout)
                .build()
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Failed to build JWKS HTTP client, using defaults");
                    reqwest::Client::new()
                }),
        };

        JwksManager {
            endpoint: self.endpoint,
            ttl: self.ttl,
            client,
            clock: self.clock,
            cache: Arc::new(Mutex::new(CacheState {
                keys: None,
                stale_after: DateTime::<Utc>::UNIX_EPOCH,
            })),
        }
    }
}

impl JwksManager {
    /// Create a JWKS manager with default TTL, timeout and clock.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::builder(endpoint).build()
    }

    pub fn builder(endpoint: impl Into<String>) -> JwksManagerBuilder {
        JwksManagerBuilder {
            endpoint: endpoint.into(),
            ttl: DEFAULT_JWKS_TTL,
            timeout: DEFAULT_FETCH_TIMEOUT,
            client: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Get the JWKS URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve a key, abandoning any refresh in flight if `cancel` fires.
    ///
    /// Cancellation drops the fetch before the swap, so the cache stays at
    /// its last good state.
    pub async fn resolve_cancellable(
        &self,
        kid: &str,
        cancel: &CancellationToken,
    ) -> Result<KeyEntry, KeySourceError> {
        let keys = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(KeySourceError::Cancelled),
            keys = self.current_keys() => keys?,
        };
        lookup(&keys, kid)
    }

    /// Force refresh the JWKS cache, regardless of staleness.
    pub async fn refresh(&self) -> Result<(), KeySourceError> {
        let mut state = self.cache.lock().await;
        let keys = self.fetch().await?;
        self.install(&mut state, keys);
        Ok(())
    }

    /// Check if JWKS is currently cached and fresh.
    pub async fn is_cached(&self) -> bool {
        let state = self.cache.lock().await;
        state.keys.is_some() && self.clock.now() < state.stale_after
    }

    /// Snapshot of the cached key set, fresh or not.
    pub async fn cached_keys(&self) -> Option<Arc<KeySet>> {
        self.cache.lock().await.keys.clone()
    }

    /// Return a fresh snapshot, refetching first if the cache is stale.
    async fn current_keys(&self) -> Result<Arc<KeySet>, KeySourceError> {
        let mut state = self.cache.lock().await;

        if self.clock.now() < state.stale_after {
            if let Some(keys) = &state.keys {
                return Ok(Arc::clone(keys));
            }
        }

        let keys = self.fetch().await.inspect_err(|e| {
            warn!(endpoint = %self.endpoint, error = %e, "JWKS refresh failed");
        })?;
        Ok(self.install(&mut state, keys))
    }

    fn install(&self, state: &mut CacheState, keys: KeySet) -> Arc<KeySet> {
        let now = self.clock.now();
        let keys = Arc::new(keys);
        debug!(endpoint = %self.endpoint, keys = keys.len(), "JWKS refreshed");

        state.keys = Some(Arc::clone(&keys));
        state.stale_after = TimeDelta::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        keys
    }

    /// Fetch JWKS from the endpoint.
    async fn fetch(&self) -> Result<KeySet, KeySourceError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| KeySourceError::Fetch(e.to_string()))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(KeySourceError::Status(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| KeySourceError::Fetch(e.to_string()))?;

        KeySet::from_json(&body)
    }
}

fn lookup(keys: &KeySet, kid: &str) -> Result<KeyEntry, KeySourceError> {
    keys.find(kid)
        .cloned()
        .ok_or_else(|| KeySourceError::KeyNotFound(kid.to_string()))
}

#[async_trait]
impl KeySource for JwksManager {
    async fn resolve(&self, kid: &str) -> Result<KeyEntry, KeySourceError> {
        let keys = self.current_keys().await?;
        lookup(&keys, kid)
    }
}
