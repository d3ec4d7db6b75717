// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request trace annotations and metadata.
//!
//! Annotations are low-cardinality scalar fields meant for indexing;
//! metadata is free-form. A bag either keeps them itself (standalone, with a
//! generated correlation id) or forwards them to an external trace segment so
//! that trace and log correlation ids coincide. The backing store is chosen
//! once when the bag is created.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use uuid::Uuid;

use crate::context::RequestContext;

/// An annotation value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Convert a JSON value, or `None` for arrays, objects and null.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Scalar::Bool(b)),
            Value::Number(n) => n
                .as_i64()
                .map(Scalar::Int)
                .or_else(|| n.as_u64().map(Scalar::UInt))
                .or_else(|| n.as_f64().map(Scalar::Float)),
            Value::String(s) => Some(Scalar::String(s)),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(i) => Value::from(i),
            Scalar::UInt(u) => Value::from(u),
            Scalar::Float(f) => Value::from(f),
            Scalar::String(s) => Value::String(s),
        }
    }
}

/// An external trace segment that annotations can be forwarded to.
///
/// Implementations do their own locking.
pub trait TraceSegment: Send + Sync {
    fn trace_id(&self) -> String;
    fn user(&self) -> String;
    fn set_user(&self, user: &str);
    fn add_annotation(&self, key: &str, value: Scalar);
    fn add_metadata(&self, key: &str, value: Value);
    fn annotations(&self) -> HashMap<String, Scalar>;
    fn metadata(&self) -> HashMap<String, Value>;
}

/// Looks up the trace segment for an incoming request, if tracing is active.
pub trait SegmentProvider: Send + Sync {
    fn current_segment(&self, ctx: &RequestContext) -> Option<Arc<dyn TraceSegment>>;
}

#[derive(Default)]
struct LocalState {
    user: String,
    annotations: HashMap<String, Scalar>,
    metadata: HashMap<String, Value>,
}

enum Backing {
    Standalone { id: String, state: Mutex<LocalState> },
    Segment(Arc<dyn TraceSegment>),
}

/// The annotation bag for one request.
pub struct Annotations {
    backing: Backing,
}

impl std::fmt::Debug for Annotations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotations")
            .field("id", &self.id())
            .field("standalone", &matches!(self.backing, Backing::Standalone { .. }))
            .finish()
    }
}

impl Annotations {
    /// A bag with its own storage and a fresh correlation id.
    pub fn standalone() -> Self {
        Self {
            backing: Backing::Standalone {
                id: Uuid::new_v4().to_string(),
                state: Mutex::new(LocalState::default()),
            },
        }
    }

    /// A bag that forwards everything to `segment`.
    pub fn for_segment(segment: Arc<dyn TraceSegment>) -> Self {
        Self {
            backing: Backing::Segment(segment),
        }
    }

    fn local(state: &Mutex<LocalState>) -> MutexGuard<'_, LocalState> {
        state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Correlation id: the trace id when segment-backed.
    pub fn id(&self) -> String {
        match &self.backing {
            Backing::Standalone { id, .. } => id.clone(),
            Backing::Segment(segment) => segment.trace_id(),
        }
    }

    pub fn user(&self) -> String {
        match &self.backing {
            Backing::Standalone { state, .. } => Self::local(state).user.clone(),
            Backing::Segment(segment) => segment.user(),
        }
    }

    pub fn set_user(&self, user: &str) {
        match &self.backing {
            Backing::Standalone { state, .. } => Self::local(state).user = user.to_string(),
            Backing::Segment(segment) => segment.set_user(user),
        }
    }

    /// Add an annotation. Values that are not scalars are dropped.
    pub fn add_annotation(&self, key: &str, value: impl Into<Value>) {
        let Some(scalar) = Scalar::from_value(value.into()) else {
            return;
        };
        match &self.backing {
            Backing::Standalone { state, .. } => {
                Self::local(state).annotations.insert(key.to_string(), scalar);
            }
            Backing::Segment(segment) => segment.add_annotation(key, scalar),
        }
    }

    pub fn add_metadata(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match &self.backing {
            Backing::Standalone { state, .. } => {
                Self::local(state).metadata.insert(key.to_string(), value);
            }
            Backing::Segment(segment) => segment.add_metadata(key, value),
        }
    }

    /// A copy of the current annotations.
    pub fn annotations(&self) -> HashMap<String, Scalar> {
        match &self.backing {
            Backing::Standalone { state, .. } => Self::local(state).annotations.clone(),
            Backing::Segment(segment) => segment.annotations(),
        }
    }

    /// A copy of the current metadata.
    pub fn metadata(&self) -> HashMap<String, Value> {
        match &self.backing {
            Backing::Standalone { state, .. } => Self::local(state).metadata.clone(),
            Backing::Segment(segment) => segment.metadata(),
        }
    }
}

/// Derive a context with a fresh bag, forwarding to the provider's segment
/// when there is one.
pub fn attach(ctx: &RequestContext, provider: Option<&dyn SegmentProvider>) -> RequestContext {
    let bag = match provider.and_then(|p| p.current_segment(ctx)) {
        Some(segment) => Annotations::for_segment(segment),
        None => Annotations::standalone(),
    };
    ctx.with_value(Arc::new(bag))
}

/// The bag attached to `ctx`, if any.
pub fn get(ctx: &RequestContext) -> Option<&Arc<Annotations>> {
    ctx.get::<Arc<Annotations>>()
}

/// Set the user on the request's bag. A no-op without a bag.
pub fn set_user(ctx: &RequestContext, user: &str) {
    if let Some(bag) = get(ctx) {
        bag.set_user(user);
    }
}

/// Add an annotation to the request's bag. A no-op without a bag.
pub fn add_annotation(ctx: &RequestContext, key: &str, value: impl Into<Value>) {
    if let Some(bag) = get(ctx) {
        bag.add_annotation(key, value);
    }
}

/// Add metadata to the request's bag. A no-op without a bag.
pub fn add_metadata(ctx: &RequestContext, key: &str, value: impl Into<Value>) {
    if let Some(bag) = get(ctx) {
        bag.add_metadata(key, value);
    }
}
