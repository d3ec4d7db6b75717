// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication outcome carried in the request context.
//!
//! Consumers branch on three states: authentication never ran, it ran and
//! failed, or it succeeded. A missing bearer token is a failure with
//! [`AuthError::NoToken`], not the absent state.

use axum::http::HeaderValue;

use super::claims::Claims;
use super::error::AuthError;
use crate::context::RequestContext;

/// A verified access token and its claims.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthInfo {
    pub access_token: String,
    pub claims: Claims,
}

impl AuthInfo {
    /// Forward the caller's access token on an outgoing request.
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.access_token)
    }
}

/// Authentication state of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthState {
    /// No authentication stage ran for this request
    #[default]
    NotPresent,
    Failed(AuthError),
    Authenticated(AuthInfo),
}

static NOT_PRESENT: AuthState = AuthState::NotPresent;

impl AuthState {
    pub fn info(&self) -> Option<&AuthInfo> {
        match self {
            AuthState::Authenticated(info) => Some(info),
            _ => None,
        }
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.info().map(|info| &info.claims)
    }

    pub fn error(&self) -> Option<&AuthError> {
        match self {
            AuthState::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, AuthState::NotPresent)
    }

    /// Collapse into a result, treating the absent state as
    /// [`AuthError::NotAuthenticated`].
    pub fn into_result(self) -> Result<AuthInfo, AuthError> {
        match self {
            AuthState::Authenticated(info) => Ok(info),
            AuthState::Failed(err) => Err(err),
            AuthState::NotPresent => Err(AuthError::NotAuthenticated),
        }
    }
}

impl From<Result<AuthInfo, AuthError>> for AuthState {
    fn from(result: Result<AuthInfo, AuthError>) -> Self {
        match result {
            Ok(info) => AuthState::Authenticated(info),
            Err(err) => AuthState::Failed(err),
        }
    }
}

/// Derive a context carrying the authentication result.
pub fn attach(ctx: &RequestContext, result: Result<AuthInfo, AuthError>) -> RequestContext {
    ctx.with_value(AuthState::from(result))
}

/// The authentication state recorded on `ctx`.
pub fn read(ctx: &RequestContext) -> &AuthState {
    ctx.get::<AuthState>().unwrap_or(&NOT_PRESENT)
}

/// The verified identity on `ctx`, or why there is none.
pub fn get_auth(ctx: &RequestContext) -> Result<AuthInfo, AuthError> {
    read(ctx).clone().into_result()
}

/// `Authorization` header value for calling another service as the caller.
pub fn outgoing_bearer(ctx: &RequestContext) -> Result<HeaderValue, AuthError> {
    let info = get_auth(ctx)?;
    HeaderValue::from_str(&format!("Bearer {}", info.access_token))
        .map_err(|_| AuthError::InvalidToken(super::error::InvalidTokenReason::Malformed))
}
