// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token validation against a [`KeySource`].
//!
//! The checks run in a fixed order. Algorithm and token-type checks come
//! first because they are cheap and need no key; the unverified claims used
//! for the type check are discarded and the claims returned to the caller are
//! the ones decoded during signature verification.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, Validation};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::claims::{Claims, TOKEN_TYPE_ACCESS_TOKEN};
use super::clock::{Clock, SystemClock};
use super::error::{InvalidTokenReason, KeySourceError, TokenError};
use super::jwks::{KeyEntry, KeySource};

/// Clock skew tolerance (60 seconds).
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(60);

/// The parts of the JOSE header we act on.
#[derive(Debug, Deserialize)]
struct TokenHeader {
    #[serde(default)]
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Validates signed tokens using keys resolved by id.
#[derive(Clone)]
pub struct TokenValidator {
    keys: Arc<dyn KeySource>,
    clock: Arc<dyn Clock>,
    leeway: Duration,
}

impl TokenValidator {
    pub fn new(keys: Arc<dyn KeySource>) -> Self {
        Self {
            keys,
            clock: Arc::new(SystemClock),
            leeway: DEFAULT_LEEWAY,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the tolerance applied to `exp`, `iat` and `nbf`.
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Validate an access token.
    pub async fn validate_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate(token, TOKEN_TYPE_ACCESS_TOKEN).await
    }

    /// Validate `token` and require its `ntt` claim to equal `expected_type`.
    ///
    /// Dropping the returned future abandons the validation along with any
    /// key-set fetch it is waiting on; a fetch only replaces the cached keys
    /// once it has completed.
    pub async fn validate(&self, token: &str, expected_type: &str) -> Result<Claims, TokenError> {
        let result = self.check(token, expected_type).await;
        if let Err(err) = &result {
            debug!(error = %err, "Token rejected");
        }
        result
    }

    /// Like [`validate`](Self::validate), but gives up when `cancel` fires.
    pub async fn validate_cancellable(
        &self,
        token: &str,
        expected_type: &str,
        cancel: &CancellationToken,
    ) -> Result<Claims, TokenError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TokenError::KeySetUnavailable(KeySourceError::Cancelled)),
            result = self.validate(token, expected_type) => result,
        }
    }

    async fn check(&self, token: &str, expected_type: &str) -> Result<Claims, TokenError> {
        let (header, unverified) = parse_unverified(token)?;

        let algorithm =
            rsa_algorithm(&header.alg).ok_or(InvalidTokenReason::UnexpectedAlgorithm)?;

        if unverified.token_type != expected_type {
            return Err(InvalidTokenReason::UnexpectedTokenType.into());
        }

        let kid = header.kid.as_deref().ok_or(InvalidTokenReason::UnknownKey)?;
        let key = self.resolve_key(kid).await?;

        if key.algorithm() != header.alg {
            return Err(InvalidTokenReason::AlgorithmMismatch.into());
        }

        let claims = verify_signature(token, &key, algorithm)?;
        self.check_validity_window(&claims)?;

        Ok(claims)
    }

    async fn resolve_key(&self, kid: &str) -> Result<KeyEntry, TokenError> {
        match self.keys.resolve(kid).await {
            Ok(key) => Ok(key),
            Err(KeySourceError::KeyNotFound(_)) => Err(InvalidTokenReason::UnknownKey.into()),
            Err(err) => Err(TokenError::KeySetUnavailable(err)),
        }
    }

    fn check_validity_window(&self, claims: &Claims) -> Result<(), InvalidTokenReason> {
        let now = self.clock.now().timestamp();
        let leeway = i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX);

        if let Some(exp) = claims.exp {
            if exp < now.saturating_sub(leeway) {
                return Err(InvalidTokenReason::Expired);
            }
        }

        let not_before = now.saturating_add(leeway);
        if claims.nbf.is_some_and(|nbf| nbf > not_before)
            || claims.iat.is_some_and(|iat| iat > not_before)
        {
            return Err(InvalidTokenReason::NotYetValid);
        }

        Ok(())
    }
}

/// Split a compact JWS and decode header and claims without verifying.
fn parse_unverified(token: &str) -> Result<(TokenHeader, Claims), InvalidTokenReason> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(InvalidTokenReason::Malformed);
    };

    if signature.is_empty() || URL_SAFE_NO_PAD.decode(signature).is_err() {
        return Err(InvalidTokenReason::Malformed);
    }

    let header: TokenHeader = decode_segment(header)?;
    let claims: Claims = decode_segment(payload)?;
    Ok((header, claims))
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, InvalidTokenReason> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| InvalidTokenReason::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| InvalidTokenReason::Malformed)
}

/// Map a JWA name to an RSASSA-PKCS1-v1_5 algorithm.
fn rsa_algorithm(alg: &str) -> Option<Algorithm> {
    match alg {
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        _ => None,
    }
}

/// Verify the signature and return the claims it covers.
///
/// Temporal claims are checked separately against the injected clock.
fn verify_signature(
    token: &str,
    key: &KeyEntry,
    algorithm: Algorithm,
) -> Result<Claims, InvalidTokenReason> {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, key.decoding_key(), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidRsaKey(_) => {
                InvalidTokenReason::BadSignature
            }
            _ => InvalidTokenReason::Malformed,
        })
}
