// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Helpers shared by the integration tests: a signing key, a local identity
//! provider and a request runner.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    routing::get,
    Json, Router,
};
use rpc_auth_hooks::auth::{jwks_endpoint, Claims, TOKEN_TYPE_ACCESS_TOKEN};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

mod signing;

pub use signing::{access_claims, jwks_document, primary_signer};

/// The published half of the primary signing key.
pub fn jwks() -> Value {
    jwks_document(vec![primary_signer().jwk("RS512")])
}

/// An RS512 access token signed with the primary key.
pub fn sign(claims: &Claims) -> String {
    primary_signer().sign(jsonwebtoken::Algorithm::RS512, claims)
}

/// Identity provider serving [`jwks`] on `/v1/jwks`.
pub struct IdentityProvider {
    addr: SocketAddr,
    fetches: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

async fn serve_jwks(State(fetches): State<Arc<AtomicUsize>>) -> Json<Value> {
    fetches.fetch_add(1, Ordering::SeqCst);
    Json(jwks())
}

impl IdentityProvider {
    pub async fn start() -> Self {
        let fetches = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/v1/jwks", get(serve_jwks))
            .with_state(fetches.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local address");
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await;
        });
        Self {
            addr,
            fetches,
            shutdown,
        }
    }

    pub fn jwks_url(&self) -> String {
        jwks_endpoint(&format!("http://{}", self.addr))
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Drop for IdentityProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// POST `body` to `path`, optionally with a bearer token, and return the
/// status and JSON body (`Null` when empty).
pub async fn call(app: &Router, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut request = Request::post(path).header("content-type", "application/json");
    if let Some(token) = token {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = request.body(Body::from(body.to_string())).expect("request builds");

    let response = app.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, json)
}
