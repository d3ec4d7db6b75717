// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! RPC Auth Hooks - bearer-token authentication and observability for RPC servers
//!
//! Validates bearer tokens against a key set published by an identity
//! service, attaches the verified identity to the request context, and counts,
//! times and traces every call whatever the authentication outcome.
//!
//! ## Modules
//!
//! - `auth` - Key sets, token validation and the request auth state
//! - `annotations` - Per-request trace annotations
//! - `hooks` - Lifecycle hooks: authentication, metrics, error logging
//! - `rpc` - Runs the hooks around Twirp-style axum routes
//! - `registry` - Labelled metric families over a `metrics` recorder
//! - `health` - Internal `/health` and `/metrics` endpoints

pub mod annotations;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod hooks;
pub mod observability;
pub mod registry;
pub mod rpc;
pub mod state;

#[cfg(test)]
mod testutil;
