// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use metrics_exporter_prometheus::PrometheusHandle;

use crate::auth::JwksManager;

/// State shared by the internal (`/health`, `/metrics`) routes.
#[derive(Clone, Default)]
pub struct AppState {
    /// Key source to check; `None` when authentication is not configured
    pub jwks: Option<JwksManager>,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(jwks: Option<JwksManager>, prometheus: Option<PrometheusHandle>) -> Self {
        Self { jwks, prometheus }
    }
}
