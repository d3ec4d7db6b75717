// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error response logging.

use async_trait::async_trait;
use tracing::{error, Level};

use super::ServerHooks;
use crate::context::RequestContext;
use crate::error::RpcError;
use crate::observability::annotation_fields;

/// Logs every error response together with the request's annotations.
///
/// Service and method are not logged separately; they are annotations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorLoggingHooks;

#[async_trait]
impl ServerHooks for ErrorLoggingHooks {
    fn error(&self, ctx: &RequestContext, err: &RpcError) {
        let fields = annotation_fields(ctx, Level::ERROR);
        let (trace_id, user, annotations, metadata) = match &fields {
            Some(f) => (
                f.trace_id.as_str(),
                f.user.as_str(),
                f.annotations.to_string(),
                f.metadata.as_ref().map(|m| m.to_string()).unwrap_or_default(),
            ),
            None => ("", "", String::new(), String::new()),
        };

        error!(
            status_code = err.http_status().as_u16(),
            twirp_code = %err.code,
            twirp_msg = %err.msg,
            twirp_meta = ?err.meta,
            trace_id,
            user,
            annotations = %annotations,
            metadata = %metadata,
            "error response"
        );
    }
}
