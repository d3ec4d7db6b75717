// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication on the request-routed stage.

use async_trait::async_trait;

use super::ServerHooks;
use crate::auth::{self, Authenticator, AuthState};
use crate::context::RequestContext;
use crate::error::RpcError;

/// Whether a failed authentication fails the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Fail the call with the authentication error.
    #[default]
    Required,
    /// Record the outcome and let the handler decide.
    Optional,
}

/// Validates the bearer token once the call is routed.
///
/// The outcome is always recorded in the context, whatever the mode, so
/// later stages can label metrics and logs with it.
#[derive(Debug, Clone)]
pub struct AuthenticationHook {
    authenticator: Authenticator,
    mode: AuthMode,
}

impl AuthenticationHook {
    pub fn new(authenticator: Authenticator, mode: AuthMode) -> Self {
        Self {
            authenticator,
            mode,
        }
    }

    pub fn required(authenticator: Authenticator) -> Self {
        Self::new(authenticator, AuthMode::Required)
    }

    pub fn optional(authenticator: Authenticator) -> Self {
        Self::new(authenticator, AuthMode::Optional)
    }
}

#[async_trait]
impl ServerHooks for AuthenticationHook {
    async fn request_routed(&self, ctx: &mut RequestContext) -> Result<(), RpcError> {
        let headers = ctx.headers().cloned();
        *ctx = self
            .authenticator
            .authenticate_context(ctx, headers.as_ref())
            .await;

        match (self.mode, auth::read(ctx)) {
            (AuthMode::Required, AuthState::Failed(err)) => Err(RpcError::from(err.clone())),
            _ => Ok(()),
        }
    }
}
