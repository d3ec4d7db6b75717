// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request, response and duration metrics per RPC method and organisation.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::warn;

use super::ServerHooks;
use crate::auth;
use crate::context::RequestContext;
use crate::error::RpcError;
use crate::registry::{CounterVec, HistogramVec, MetricsError, MetricsRegistry};

pub const RPC_REQUESTS_TOTAL: &str = "rpc_requests_total";
pub const RPC_RESPONSES_TOTAL: &str = "rpc_responses_total";
pub const RPC_DURATION: &str = "rpc_duration";

/// Exponential buckets in milliseconds: 5, 10, 20, ... 81920.
pub const DURATION_BUCKETS: [f64; 15] = [
    5.0, 10.0, 20.0, 40.0, 80.0, 160.0, 320.0, 640.0, 1280.0, 2560.0, 5120.0, 10240.0, 20480.0,
    40960.0, 81920.0,
];

static DEFAULT_REGISTRY: OnceLock<(MetricsRegistry, PrometheusHandle)> = OnceLock::new();

/// The process-wide Prometheus registry used when no registry is configured.
pub fn default_registry() -> &'static (MetricsRegistry, PrometheusHandle) {
    DEFAULT_REGISTRY.get_or_init(|| {
        match MetricsRegistry::prometheus(&[(RPC_DURATION, &DURATION_BUCKETS[..])]) {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "Falling back to default histogram buckets");
                let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
                let handle = recorder.handle();
                (MetricsRegistry::new(recorder), handle)
            }
        }
    })
}

/// Resolves the organisation label for a request.
pub type OrganisationResolver = Arc<dyn Fn(&RequestContext) -> String + Send + Sync>;

/// Organisation from the verified claims, empty when unauthenticated.
pub fn claims_organisation(ctx: &RequestContext) -> String {
    auth::read(ctx)
        .claims()
        .map(|claims| claims.org.clone())
        .unwrap_or_default()
}

/// Options for [`RpcMetricsHooks`].
#[derive(Clone, Default)]
pub struct RpcMetricsOptions {
    registry: Option<MetricsRegistry>,
    organisation: Option<OrganisationResolver>,
    test_latency: Option<Duration>,
}

impl fmt::Debug for RpcMetricsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcMetricsOptions")
            .field("custom_registry", &self.registry.is_some())
            .field("test_latency", &self.test_latency)
            .finish_non_exhaustive()
    }
}

impl RpcMetricsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: MetricsRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use a custom function for resolving the organisation label.
    pub fn organisation_resolver(
        mut self,
        resolver: impl Fn(&RequestContext) -> String + Send + Sync + 'static,
    ) -> Self {
        self.organisation = Some(Arc::new(resolver));
        self
    }

    /// Report `latency` as the duration of every call.
    pub fn static_test_latency(mut self, latency: Duration) -> Self {
        self.test_latency = Some(latency);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct RequestStart(Instant);

/// Records `rpc_requests_total` on routing and `rpc_responses_total` plus
/// `rpc_duration` (milliseconds) when the response is sent.
///
/// Never fails a request; recording problems are logged.
pub struct RpcMetricsHooks {
    requests: CounterVec,
    responses: CounterVec,
    duration: HistogramVec,
    organisation: OrganisationResolver,
    test_latency: Option<Duration>,
}

impl RpcMetricsHooks {
    /// Register the metric families. Fails if any of them already exists in
    /// the registry.
    pub fn new(options: RpcMetricsOptions) -> Result<Self, MetricsError> {
        let registry = match options.registry {
            Some(registry) => registry,
            None => default_registry().0.clone(),
        };

        let requests = registry.counter_vec(
            RPC_REQUESTS_TOTAL,
            "Number of RPC requests received.",
            &["service", "method", "organisation"],
        )?;
        let duration = registry.histogram_vec(
            RPC_DURATION,
            "Duration for a rpc call.",
            &["service", "method", "organisation"],
        )?;
        let responses = registry.counter_vec(
            RPC_RESPONSES_TOTAL,
            "Number of RPC responses sent.",
            &["service", "method", "status", "organisation"],
        )?;

        Ok(Self {
            requests,
            responses,
            duration,
            organisation: options
                .organisation
                .unwrap_or_else(|| Arc::new(claims_organisation)),
            test_latency: options.test_latency,
        })
    }

    fn elapsed_ms(&self, start: Instant) -> f64 {
        let elapsed = self.test_latency.unwrap_or_else(|| start.elapsed());
        elapsed.as_secs_f64() * 1000.0
    }
}

#[async_trait]
impl ServerHooks for RpcMetricsHooks {
    async fn request_received(&self, ctx: &mut RequestContext) -> Result<(), RpcError> {
        ctx.insert(RequestStart(Instant::now()));
        Ok(())
    }

    async fn request_routed(&self, ctx: &mut RequestContext) -> Result<(), RpcError> {
        let Some(route) = ctx.route() else {
            return Ok(());
        };
        let organisation = (self.organisation)(ctx);

        match self
            .requests
            .with_label_values(&[route.service.as_str(), route.method.as_str(), organisation.as_str()])
        {
            Ok(counter) => counter.increment(1),
            Err(err) => warn!(error = %err, "Failed to record request metric"),
        }
        Ok(())
    }

    fn response_sent(&self, ctx: &RequestContext) {
        let Some(route) = ctx.route() else {
            return;
        };
        let organisation = (self.organisation)(ctx);
        let status = ctx
            .status()
            .map(|s| s.as_u16().to_string())
            .unwrap_or_default();

        match self
            .responses
            .with_label_values(&[
                route.service.as_str(),
                route.method.as_str(),
                status.as_str(),
                organisation.as_str(),
            ])
        {
            Ok(counter) => counter.increment(1),
            Err(err) => warn!(error = %err, "Failed to record response metric"),
        }

        if let Some(RequestStart(start)) = ctx.get::<RequestStart>().copied() {
            match self
                .duration
                .with_label_values(&[route.service.as_str(), route.method.as_str(), organisation.as_str()])
            {
                Ok(histogram) => histogram.record(self.elapsed_ms(start)),
                Err(err) => warn!(error = %err, "Failed to record duration metric"),
            }
        }
    }
}
