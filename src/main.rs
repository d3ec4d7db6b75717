// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::error::Error;
use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use rpc_auth_hooks::{
    annotations,
    auth::{self, jwks_endpoint, Authenticator, JwksManager, TokenValidator},
    config::Settings,
    context::RequestContext,
    error::{ErrorCode, RpcError},
    health::internal_router,
    hooks::{
        rpc_metrics::default_registry, standard_hooks, AuthenticationHook, RpcMetricsOptions,
        ServerHooks, StandardHookOptions,
    },
    observability::init_tracing,
    rpc::{hooks_middleware, RpcHooksState, TWIRP_PREFIX},
    state::AppState,
};

#[derive(Debug, Deserialize)]
struct HelloRequest {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Serialize)]
struct HelloResponse {
    message: String,
}

/// `demo.Greeter/Hello`
async fn hello(
    ctx: RequestContext,
    Json(request): Json<HelloRequest>,
) -> Result<Json<HelloResponse>, RpcError> {
    if request.name.is_empty() {
        return Err(
            RpcError::new(ErrorCode::InvalidArgument, "name is required").with_meta("argument", "name"),
        );
    }
    annotations::add_annotation(&ctx, "greeting_name", request.name.as_str());

    let message = match auth::read(&ctx).claims() {
        Some(claims) => format!("Hello {}, from {}", request.name, claims.org),
        None => format!("Hello {}", request.name),
    };
    Ok(Json(HelloResponse { message }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let settings = Settings::from_env()?;
    init_tracing(settings.log_format);

    let (_, prometheus) = default_registry();

    let jwks = settings.imas_url.as_ref().map(|url| {
        JwksManager::builder(jwks_endpoint(url.as_str()))
            .ttl(settings.jwks_ttl)
            .timeout(settings.jwks_timeout)
            .build()
    });

    let auth_hook = jwks.clone().map(|keys| {
        let validator = TokenValidator::new(Arc::new(keys)).with_leeway(settings.token_leeway);
        Arc::new(AuthenticationHook::required(Authenticator::new(validator)))
            as Arc<dyn ServerHooks>
    });
    if auth_hook.is_none() {
        info!("IMAS_URL not set, calls are not authenticated");
    }

    let hooks = standard_hooks(StandardHookOptions {
        auth_hook,
        metrics: RpcMetricsOptions::new(),
        ..StandardHookOptions::default()
    })?;

    let public = Router::new()
        .route(&format!("{TWIRP_PREFIX}/demo.Greeter/Hello"), post(hello))
        .layer(from_fn_with_state(RpcHooksState::new(hooks), hooks_middleware))
        .layer(TraceLayer::new_for_http());
    let internal = internal_router(AppState::new(jwks, Some(prometheus.clone())));

    let public_listener = TcpListener::bind(settings.public_addr()).await?;
    let internal_listener = TcpListener::bind(settings.internal_addr()).await?;
    info!(addr = %settings.public_addr(), "RPC server listening");
    info!(addr = %settings.internal_addr(), "Internal server listening (/health, /metrics)");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for ctrl-c");
        }
        info!("Shutting down");
        signal.cancel();
    });

    let public = axum::serve(public_listener, public)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let internal = axum::serve(internal_listener, internal)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    tokio::try_join!(async { public.await }, async { internal.await })?;
    Ok(())
}
