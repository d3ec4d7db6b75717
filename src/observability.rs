// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tracing subscriber setup and request log enrichment.
//!
//! Initialization is guarded by `OnceLock` so tests and embedders can call
//! it more than once.

use std::str::FromStr;
use std::sync::OnceLock;

use serde_json::{Map, Value};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::annotations;
use crate::context::RequestContext;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

/// Install the global tracing subscriber.
pub fn init_tracing(format: LogFormat) {
    TRACING_INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        let registry = tracing_subscriber::registry().with(filter);
        let _ = match format {
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
                .try_init(),
            LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        };
    });
}

/// Correlation fields for a record emitted while handling a request.
#[derive(Debug, Clone, PartialEq)]
pub struct LogFields {
    pub trace_id: String,
    pub user: String,
    pub annotations: Value,
    /// Only set for WARN and more severe records
    pub metadata: Option<Value>,
}

/// The fields a record at `level` should carry for `ctx`, if the request has
/// an annotation bag.
pub fn annotation_fields(ctx: &RequestContext, level: Level) -> Option<LogFields> {
    let bag = annotations::get(ctx)?;

    let annotations: Map<String, Value> = bag
        .annotations()
        .into_iter()
        .map(|(key, value)| (key, Value::from(value)))
        .collect();

    // tracing orders levels by verbosity, so ERROR < WARN.
    let metadata = (level <= Level::WARN)
        .then(|| Value::Object(bag.metadata().into_iter().collect()));

    Some(LogFields {
        trace_id: bag.id(),
        user: bag.user(),
        annotations: Value::Object(annotations),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn log_format_parses() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("Pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing(LogFormat::Pretty);
        init_tracing(LogFormat::Json);
    }

    #[test]
    fn no_fields_without_a_bag() {
        assert!(annotation_fields(&RequestContext::new(), Level::ERROR).is_none());
    }

    #[test]
    fn metadata_only_at_warn_and_above() {
        let ctx = annotations::attach(&RequestContext::new(), None);
        annotations::set_user(&ctx, "agent");
        annotations::add_annotation(&ctx, "imid_org", "hms-govt");
        annotations::add_metadata(&ctx, "payload", json!({"name": "Bond"}));

        let info = annotation_fields(&ctx, Level::INFO).unwrap();
        assert_eq!(info.user, "agent");
        assert_eq!(info.annotations, json!({"imid_org": "hms-govt"}));
        assert!(info.metadata.is_none());

        let warn = annotation_fields(&ctx, Level::WARN).unwrap();
        assert_eq!(warn.metadata, Some(json!({"payload": {"name": "Bond"}})));
        assert_eq!(warn.trace_id, annotations::get(&ctx).unwrap().id());

        assert!(annotation_fields(&ctx, Level::ERROR).unwrap().metadata.is_some());
    }
}
