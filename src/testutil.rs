// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared unit-test fixtures: signing keys, a stub identity provider and
//! in-memory key sources.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::auth::claims::{Claims, TOKEN_TYPE_ACCESS_TOKEN};
use crate::auth::error::KeySourceError;
use crate::auth::jwks::{KeyEntry, KeySet, KeySource};

#[path = "../tests/common/signing.rs"]
mod signing;

pub use signing::{access_claims, jwks_document, primary_signer, rogue_signer};

/// What the stub answers on `/v1/jwks`.
#[derive(Clone)]
pub enum StubResponse {
    Jwks(Value),
    Status(u16),
    Body(String),
}

struct StubState {
    response: Mutex<StubResponse>,
    delay: Mutex<Duration>,
    fetches: AtomicUsize,
}

/// A local identity provider serving a switchable JWKS response.
pub struct StubIdentityProvider {
    addr: SocketAddr,
    state: Arc<StubState>,
    shutdown: CancellationToken,
}

impl StubIdentityProvider {
    pub async fn start(response: StubResponse) -> Self {
        let state = Arc::new(StubState {
            response: Mutex::new(response),
            delay: Mutex::new(Duration::ZERO),
            fetches: AtomicUsize::new(0),
        });
        let router = Router::new()
            .route("/v1/jwks", get(serve_jwks))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub address");
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await;
        });

        Self {
            addr,
            state,
            shutdown,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn jwks_url(&self) -> String {
        crate::auth::jwks::jwks_endpoint(&self.base_url())
    }

    pub fn fetch_count(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    pub fn respond_with(&self, response: StubResponse) {
        *self.state.response.lock().unwrap() = response;
    }

    /// Delay every response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }
}

impl Drop for StubIdentityProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn serve_jwks(State(state): State<Arc<StubState>>) -> Response {
    state.fetches.fetch_add(1, Ordering::SeqCst);

    let delay = *state.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let response = state.response.lock().unwrap().clone();
    match response {
        StubResponse::Jwks(doc) => Json(doc).into_response(),
        StubResponse::Status(code) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        StubResponse::Body(body) => body.into_response(),
    }
}

/// A fixed key set that counts lookups.
pub struct StaticKeySource {
    keys: KeySet,
    calls: AtomicUsize,
}

impl StaticKeySource {
    pub fn new(document: Value) -> Self {
        Self {
            keys: KeySet::from_json(document.to_string().as_bytes()).expect("fixture jwks"),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn resolve(&self, kid: &str) -> Result<KeyEntry, KeySourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys
            .find(kid)
            .cloned()
            .ok_or_else(|| KeySourceError::KeyNotFound(kid.to_string()))
    }
}

/// A key source whose endpoint is down.
pub struct FailingKeySource(pub KeySourceError);

#[async_trait]
impl KeySource for FailingKeySource {
    async fn resolve(&self, _kid: &str) -> Result<KeyEntry, KeySourceError> {
        Err(self.0.clone())
    }
}
