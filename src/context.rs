// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request-scoped values threaded through the hook pipeline.
//!
//! A [`RequestContext`] is a typed value map. Deriving a context with
//! [`RequestContext::with_value`] leaves the parent untouched, so values
//! added by one branch never show up in a sibling.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, Extensions, HeaderMap, StatusCode},
};

/// The RPC service and method a request was routed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRoute {
    /// Fully qualified service name, e.g. `demo.Greeter`
    pub service: String,
    pub method: String,
}

impl RpcRoute {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct RequestHeaders(HeaderMap);

#[derive(Debug, Clone, Copy)]
struct ResponseStatus(StatusCode);

/// Request-scoped value map.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    values: Extensions,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context carrying the request headers forwarded by the transport.
    pub fn with_headers(headers: HeaderMap) -> Self {
        Self::new().with_value(RequestHeaders(headers))
    }

    /// Derive a context that also carries `value`.
    ///
    /// A value of the same type already present is shadowed in the derived
    /// context only.
    pub fn with_value<T: Clone + Send + Sync + 'static>(&self, value: T) -> Self {
        let mut values = self.values.clone();
        values.insert(value);
        Self { values }
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get::<T>()
    }

    /// Set a value on this context in place.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) {
        self.values.insert(value);
    }

    pub fn route(&self) -> Option<&RpcRoute> {
        self.get::<RpcRoute>()
    }

    pub fn set_route(&mut self, route: RpcRoute) {
        self.insert(route);
    }

    /// Request headers, if the transport forwarded any.
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.get::<RequestHeaders>().map(|h| &h.0)
    }

    /// The response status, once the response has been produced.
    pub fn status(&self) -> Option<StatusCode> {
        self.get::<ResponseStatus>().map(|s| s.0)
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.insert(ResponseStatus(status));
    }
}

/// Handlers receive the context installed by the middleware, or an empty one.
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}
