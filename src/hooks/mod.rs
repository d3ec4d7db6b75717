// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Server Hooks
//!
//! Request lifecycle observers and their composition.
//!
//! ## Lifecycle
//!
//! ```text
//! request_received -> request_routed -> (handler) -> response_sent
//!                          \-- error (at most once, from any stage) --/
//! ```
//!
//! A [`HookPipeline`] runs hooks in order. The received and routed stages stop
//! at the first error; `response_sent` and `error` reach every hook.
//! [`AuthMetricsHooks`] deviates from that on the routed stage so that a
//! failed authentication is still counted.

pub mod auth;
pub mod logging;
pub mod rpc_metrics;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::{jwks_endpoint, Authenticator, JwksManager, TokenValidator};
use crate::context::RequestContext;
use crate::error::RpcError;
use crate::registry::MetricsError;

pub use self::auth::{AuthMode, AuthenticationHook};
pub use self::logging::ErrorLoggingHooks;
pub use self::rpc_metrics::{RpcMetricsHooks, RpcMetricsOptions};

/// An observer of one stage or more of an RPC call.
///
/// Every stage defaults to a no-op.
#[async_trait]
pub trait ServerHooks: Send + Sync {
    /// The request arrived; nothing is known about the route yet.
    async fn request_received(&self, _ctx: &mut RequestContext) -> Result<(), RpcError> {
        Ok(())
    }

    /// The route is known. An error here fails the call before the handler.
    async fn request_routed(&self, _ctx: &mut RequestContext) -> Result<(), RpcError> {
        Ok(())
    }

    /// The response has been produced; `ctx` carries its status.
    fn response_sent(&self, _ctx: &RequestContext) {}

    /// The call is failing with `err`.
    fn error(&self, _ctx: &RequestContext, _err: &RpcError) {}
}

/// Ordered list of hooks exposed as a single hook.
#[derive(Clone, Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn ServerHooks>>,
}

impl fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookPipeline")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook.
    pub fn with(self, hook: impl ServerHooks + 'static) -> Self {
        self.with_shared(Arc::new(hook))
    }

    pub fn with_shared(mut self, hook: Arc<dyn ServerHooks>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[async_trait]
impl ServerHooks for HookPipeline {
    async fn request_received(&self, ctx: &mut RequestContext) -> Result<(), RpcError> {
        for hook in &self.hooks {
            hook.request_received(ctx).await?;
        }
        Ok(())
    }

    async fn request_routed(&self, ctx: &mut RequestContext) -> Result<(), RpcError> {
        for hook in &self.hooks {
            hook.request_routed(ctx).await?;
        }
        Ok(())
    }

    fn response_sent(&self, ctx: &RequestContext) {
        for hook in &self.hooks {
            hook.response_sent(ctx);
        }
    }

    fn error(&self, ctx: &RequestContext, err: &RpcError) {
        for hook in &self.hooks {
            hook.error(ctx, err);
        }
    }
}

/// Metrics and authentication combined so that the metrics routed stage
/// always runs.
///
/// On the routed stage authentication runs first and its error is held;
/// metrics then run unconditionally and any error they return is dropped.
/// The authentication error is returned unchanged. Other stages run metrics
/// first, then authentication, like a [`HookPipeline`].
pub struct AuthMetricsHooks {
    metrics: Arc<dyn ServerHooks>,
    auth: Arc<dyn ServerHooks>,
}

impl AuthMetricsHooks {
    pub fn new(metrics: Arc<dyn ServerHooks>, auth: Arc<dyn ServerHooks>) -> Self {
        Self { metrics, auth }
    }
}

#[async_trait]
impl ServerHooks for AuthMetricsHooks {
    async fn request_received(&self, ctx: &mut RequestContext) -> Result<(), RpcError> {
        self.metrics.request_received(ctx).await?;
        self.auth.request_received(ctx).await
    }

    async fn request_routed(&self, ctx: &mut RequestContext) -> Result<(), RpcError> {
        let auth_result = self.auth.request_routed(ctx).await;
        let _ = self.metrics.request_routed(ctx).await;
        auth_result
    }

    fn response_sent(&self, ctx: &RequestContext) {
        self.metrics.response_sent(ctx);
        self.auth.response_sent(ctx);
    }

    fn error(&self, ctx: &RequestContext, err: &RpcError) {
        self.metrics.error(ctx, err);
        self.auth.error(ctx, err);
    }
}

/// Inputs to [`standard_hooks`].
#[derive(Default)]
pub struct StandardHookOptions {
    /// Authentication hook to use instead of one built from `imas_url`
    pub auth_hook: Option<Arc<dyn ServerHooks>>,
    /// Identity service base URL; keys are fetched from `<imas_url>/v1/jwks`
    pub imas_url: Option<String>,
    pub metrics: RpcMetricsOptions,
}

/// Assemble metrics, authentication and error logging.
///
/// Fails if the metric families cannot be registered. Without an auth hook
/// or identity service URL the calls are not authenticated.
pub fn standard_hooks(options: StandardHookOptions) -> Result<HookPipeline, MetricsError> {
    let metrics: Arc<dyn ServerHooks> = Arc::new(RpcMetricsHooks::new(options.metrics)?);

    let auth: Option<Arc<dyn ServerHooks>> = match (options.auth_hook, options.imas_url) {
        (Some(hook), _) => Some(hook),
        (None, Some(url)) => {
            let keys = JwksManager::new(jwks_endpoint(&url));
            let authenticator = Authenticator::new(TokenValidator::new(Arc::new(keys)));
            Some(Arc::new(AuthenticationHook::required(authenticator)))
        }
        (None, None) => None,
    };

    let pipeline = match auth {
        Some(auth) => HookPipeline::new().with(AuthMetricsHooks::new(metrics, auth)),
        None => HookPipeline::new().with_shared(metrics),
    };

    Ok(pipeline.with(ErrorLoggingHooks))
}
