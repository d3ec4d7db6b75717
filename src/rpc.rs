// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Runs a hook pipeline around Twirp-style routes served by axum.
//!
//! Routes follow `<prefix>/<package.Service>/<Method>`. Only requests that
//! matched a registered route run the hooks; anything that falls through to
//! the router's fallback is passed on untouched, so unknown paths keep their
//! 404 and never reach authentication or metrics.
//!
//! ```rust,ignore
//! let rpc = RpcHooksState::new(standard_hooks(options)?);
//! let app = Router::new()
//!     .route("/twirp/demo.Greeter/Hello", post(hello))
//!     .layer(axum::middleware::from_fn_with_state(rpc, hooks_middleware));
//! ```

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::annotations::{self, SegmentProvider};
use crate::context::{RequestContext, RpcRoute};
use crate::error::RpcError;
use crate::hooks::ServerHooks;

/// Conventional path prefix for Twirp services.
pub const TWIRP_PREFIX: &str = "/twirp";

/// Shared state for [`hooks_middleware`].
#[derive(Clone)]
pub struct RpcHooksState {
    hooks: Arc<dyn ServerHooks>,
    segments: Option<Arc<dyn SegmentProvider>>,
    prefix: String,
}

impl fmt::Debug for RpcHooksState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcHooksState")
            .field("prefix", &self.prefix)
            .field("tracing_segments", &self.segments.is_some())
            .finish_non_exhaustive()
    }
}

impl RpcHooksState {
    pub fn new(hooks: impl ServerHooks + 'static) -> Self {
        Self {
            hooks: Arc::new(hooks),
            segments: None,
            prefix: TWIRP_PREFIX.to_string(),
        }
    }

    /// Path prefix in front of `/<package.Service>/<Method>`; defaults to
    /// [`TWIRP_PREFIX`]. Pass `""` for routes mounted at the root.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    /// Forward annotations to trace segments found by `provider`.
    pub fn with_segment_provider(mut self, provider: impl SegmentProvider + 'static) -> Self {
        self.segments = Some(Arc::new(provider));
        self
    }
}

/// Service and method from a route of the form `<prefix>/<Service>/<Method>`.
pub fn parse_route(path: &str, prefix: &str) -> Option<RpcRoute> {
    let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
    let (service, method) = rest.split_once('/')?;
    if service.is_empty() || method.is_empty() || method.contains('/') {
        return None;
    }
    Some(RpcRoute::new(service, method))
}

/// Middleware running the hook stages around the inner handler.
///
/// Must be installed with `Router::layer` or `Router::route_layer` so the
/// matched route is known. Requests without one (the fallback) skip every
/// stage.
///
/// The request context is inserted into the request extensions so handlers
/// can extract it. An error on the received or routed stage short-circuits
/// the handler.
pub async fn hooks_middleware(
    State(state): State<RpcHooksState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(matched) = request.extensions().get::<MatchedPath>() else {
        return next.run(request).await;
    };
    let route = parse_route(matched.as_str(), &state.prefix);

    let base = RequestContext::with_headers(request.headers().clone());
    let mut ctx = annotations::attach(&base, state.segments.as_deref());

    if let Err(err) = state.hooks.request_received(&mut ctx).await {
        return fail(state.hooks.as_ref(), ctx, err);
    }

    if let Some(route) = route {
        annotations::add_annotation(&ctx, "twirp_service", route.service.as_str());
        annotations::add_annotation(&ctx, "twirp_method", route.method.as_str());
        ctx.set_route(route);
    }

    if let Err(err) = state.hooks.request_routed(&mut ctx).await {
        return fail(state.hooks.as_ref(), ctx, err);
    }

    request.extensions_mut().insert(ctx.clone());
    let response = next.run(request).await;

    if let Some(err) = RpcError::from_response(&response) {
        state.hooks.error(&ctx, err);
    }
    ctx.set_status(response.status());
    state.hooks.response_sent(&ctx);

    response
}

fn fail(hooks: &dyn ServerHooks, mut ctx: RequestContext, err: RpcError) -> Response {
    hooks.error(&ctx, &err);
    let response = err.into_response();
    ctx.set_status(response.status());
    hooks.response_sent(&ctx);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{Scalar, TraceSegment};
    use crate::auth::Auth;
    use crate::error::ErrorCode;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request, http::StatusCode, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Captures the annotations seen when the response is sent.
    #[derive(Clone, Default)]
    struct Capture {
        annotations: Arc<Mutex<HashMap<String, Scalar>>>,
        errors: Arc<Mutex<Vec<ErrorCode>>>,
        fail_received: Option<ErrorCode>,
    }

    #[async_trait]
    impl ServerHooks for Capture {
        async fn request_received(&self, _ctx: &mut RequestContext) -> Result<(), RpcError> {
            match self.fail_received {
                Some(code) => Err(RpcError::new(code, "not now")),
                None => Ok(()),
            }
        }

        fn response_sent(&self, ctx: &RequestContext) {
            if let Some(bag) = annotations::get(ctx) {
                *self.annotations.lock().unwrap() = bag.annotations();
            }
        }

        fn error(&self, _ctx: &RequestContext, err: &RpcError) {
            self.errors.lock().unwrap().push(err.code);
        }
    }

    struct NoSegments;

    impl SegmentProvider for NoSegments {
        fn current_segment(&self, _ctx: &RequestContext) -> Option<Arc<dyn TraceSegment>> {
            None
        }
    }

    fn app(state: RpcHooksState, reached: Arc<AtomicBool>) -> Router {
        Router::new()
            .route("/twirp/demo.Greeter/Strict", axum::routing::post(|_: Auth| async { "unreachable" }))
            .route(
                "/twirp/demo.Greeter/Hello",
                axum::routing::post(move || {
                    let reached = reached.clone();
                    async move {
                        reached.store(true, Ordering::SeqCst);
                        "hi"
                    }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(state, hooks_middleware))
    }

    async fn post(app: Router, path: &str) -> StatusCode {
        app.oneshot(Request::post(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    async fn post_hello(app: Router) -> StatusCode {
        post(app, "/twirp/demo.Greeter/Hello").await
    }

    #[tokio::test]
    async fn routing_annotates_service_and_method() {
        let capture = Capture::default();
        let reached = Arc::new(AtomicBool::new(false));
        let state = RpcHooksState::new(capture.clone()).with_segment_provider(NoSegments);

        let status = post_hello(app(state, reached.clone())).await;

        assert_eq!(status, StatusCode::OK);
        assert!(reached.load(Ordering::SeqCst));
        let seen = capture.annotations.lock().unwrap().clone();
        assert_eq!(seen["twirp_service"], Scalar::String("demo.Greeter".into()));
        assert_eq!(seen["twirp_method"], Scalar::String("Hello".into()));
    }

    #[tokio::test]
    async fn received_stage_error_skips_the_handler() {
        let capture = Capture {
            fail_received: Some(ErrorCode::Unavailable),
            ..Capture::default()
        };
        let reached = Arc::new(AtomicBool::new(false));

        let status = post_hello(app(RpcHooksState::new(capture), reached.clone())).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unmatched_paths_skip_the_hooks() {
        let capture = Capture {
            fail_received: Some(ErrorCode::Unavailable),
            ..Capture::default()
        };
        let reached = Arc::new(AtomicBool::new(false));
        let app = app(RpcHooksState::new(capture.clone()), reached.clone());

        assert_eq!(post(app.clone(), "/junk/svc/m").await, StatusCode::NOT_FOUND);
        assert_eq!(post(app, "/twirp/demo.Greeter/Nope").await, StatusCode::NOT_FOUND);
        assert!(capture.annotations.lock().unwrap().is_empty());
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn extractor_rejections_reach_the_error_hook() {
        let capture = Capture::default();
        let reached = Arc::new(AtomicBool::new(false));

        // No authentication hook ran, so the extractor has nothing to read.
        let status = post(
            app(RpcHooksState::new(capture.clone()), reached),
            "/twirp/demo.Greeter/Strict",
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*capture.errors.lock().unwrap(), vec![ErrorCode::Internal]);
        assert_eq!(
            capture.annotations.lock().unwrap()["twirp_method"],
            Scalar::String("Strict".into())
        );
    }

    #[test]
    fn routes_parse_below_the_prefix() {
        assert_eq!(
            parse_route("/twirp/demo.Greeter/Hello", TWIRP_PREFIX),
            Some(RpcRoute::new("demo.Greeter", "Hello"))
        );
        assert_eq!(
            parse_route("/navigaid.Users/List", ""),
            Some(RpcRoute::new("navigaid.Users", "List"))
        );
        assert_eq!(parse_route("/api/v2/navigaid.Users/List", TWIRP_PREFIX), None);
        assert_eq!(parse_route("/twirp/a/demo.Greeter/Hello", TWIRP_PREFIX), None);
        assert_eq!(parse_route("/twirp/demo.Greeter/", TWIRP_PREFIX), None);
        assert_eq!(parse_route("/twirp//Hello", TWIRP_PREFIX), None);
        assert_eq!(parse_route("/twirpx/demo.Greeter/Hello", TWIRP_PREFIX), None);
    }
}
