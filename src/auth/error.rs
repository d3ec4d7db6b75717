// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Three layers, from the inside out:
//!
//! - [`KeySourceError`]: fetching or decoding the published key set failed,
//!   or the requested key id is not in it.
//! - [`TokenError`]: a bearer token was rejected. Every structural or
//!   semantic problem is an [`InvalidTokenReason`]; only key-set outages are
//!   reported separately.
//! - [`AuthError`]: the per-request outcome stored in the request context.
//!   `NoToken` is deliberately not an invalid-token reason so handlers can
//!   offer anonymous access.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::RpcError;

/// Failure to resolve a signing key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySourceError {
    /// Transport failure talking to the JWKS endpoint.
    #[error("failed to fetch jwks: {0}")]
    Fetch(String),
    /// The endpoint answered with something other than 200 OK.
    #[error("jwks endpoint responded with: {0}")]
    Status(u16),
    /// The document was not a valid key set.
    #[error("failed to decode jwks response: {0}")]
    Decode(String),
    /// A key in the set could not be turned into an RSA public key.
    #[error("invalid key {kid:?} in jwks: {reason}")]
    InvalidKey { kid: String, reason: String },
    /// The key id is not in the current key set.
    #[error("key {0:?} not found")]
    KeyNotFound(String),
    /// The caller cancelled the refresh before it completed.
    #[error("jwks refresh was cancelled")]
    Cancelled,
}

/// Why a token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidTokenReason {
    Malformed,
    UnexpectedAlgorithm,
    UnexpectedTokenType,
    UnknownKey,
    AlgorithmMismatch,
    BadSignature,
    Expired,
    NotYetValid,
}

impl InvalidTokenReason {
    /// Stable tag used in logs and error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidTokenReason::Malformed => "malformed",
            InvalidTokenReason::UnexpectedAlgorithm => "unexpected_algorithm",
            InvalidTokenReason::UnexpectedTokenType => "unexpected_token_type",
            InvalidTokenReason::UnknownKey => "unknown_key",
            InvalidTokenReason::AlgorithmMismatch => "algorithm_mismatch",
            InvalidTokenReason::BadSignature => "bad_signature",
            InvalidTokenReason::Expired => "expired",
            InvalidTokenReason::NotYetValid => "not_yet_valid",
        }
    }
}

impl fmt::Display for InvalidTokenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a failed token validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(InvalidTokenReason),
    /// The key set could not be refreshed, so the token could not be judged.
    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(#[source] KeySourceError),
}

impl TokenError {
    /// The invalid-token reason, if this is one.
    pub fn reason(&self) -> Option<InvalidTokenReason> {
        match self {
            TokenError::Invalid(reason) => Some(*reason),
            TokenError::KeySetUnavailable(_) => None,
        }
    }
}

impl From<InvalidTokenReason> for TokenError {
    fn from(reason: InvalidTokenReason) -> Self {
        TokenError::Invalid(reason)
    }
}

/// Authentication outcome for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No bearer token was supplied
    #[error("no token found")]
    NoToken,
    /// Token was supplied and rejected
    #[error("invalid token: {0}")]
    InvalidToken(InvalidTokenReason),
    /// Token could not be checked because the key set is unreachable
    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(KeySourceError),
    /// Authentication never ran for this request
    #[error("no authentication information in context")]
    NotAuthenticated,
    /// Authenticated, but lacking a required permission
    #[error("insufficient permissions for this operation")]
    InsufficientPermissions,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::NoToken => "no_token",
            AuthError::InvalidToken(reason) => reason.as_str(),
            AuthError::KeySetUnavailable(_) => "jwks_unavailable",
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::InsufficientPermissions => "insufficient_permissions",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NoToken | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AuthError::KeySetUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::NotAuthenticated => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_no_token(&self) -> bool {
        matches!(self, AuthError::NoToken)
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid(reason) => AuthError::InvalidToken(reason),
            TokenError::KeySetUnavailable(source) => AuthError::KeySetUnavailable(source),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        let mut response = (status, body).into_response();
        // Lets the RPC hook runner report extractor rejections as errors.
        response.extensions_mut().insert(RpcError::from(self));
        response
    }
}
