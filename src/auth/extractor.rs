// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the authentication state.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(info): Auth) -> impl IntoResponse {
//!     // info.claims are verified
//! }
//! ```
//!
//! Both extractors read what [`super::middleware::authenticate`] or the
//! authentication hook recorded; neither validates tokens itself.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::context::{read, AuthInfo, AuthState};
use super::AuthError;
use crate::context::RequestContext;

fn recorded_state(parts: &Parts) -> AuthState {
    parts
        .extensions
        .get::<RequestContext>()
        .map(|ctx| read(ctx).clone())
        .unwrap_or_default()
}

/// Extractor for authenticated callers.
///
/// Rejects with the recorded [`AuthError`], or with
/// [`AuthError::NotAuthenticated`] when no authentication ran.
pub struct Auth(pub AuthInfo);

impl<S: Send + Sync> FromRequestParts<S> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        recorded_state(parts).into_result().map(Auth)
    }
}

/// Optional authentication extractor.
///
/// Never rejects; handlers branch on the three-state [`AuthState`].
pub struct OptionalAuth(pub AuthState);

impl<S: Send + Sync> FromRequestParts<S> for OptionalAuth {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(recorded_state(parts)))
    }
}
