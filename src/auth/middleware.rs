// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! The middleware never rejects a request. It records the outcome in the
//! [`RequestContext`] stored in the request extensions and leaves the decision
//! to the handler, so endpoints can be optionally authenticated.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let authenticator = Authenticator::new(validator);
//!
//! let app = Router::new()
//!     .route("/things", get(list_things))
//!     .layer(axum::middleware::from_fn_with_state(authenticator, authenticate));
//! ```

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::claims::Claims;
use super::context::{self, AuthInfo};
use super::error::AuthError;
use super::validator::TokenValidator;
use crate::annotations;
use crate::context::RequestContext;

/// Annotation holding the caller's organisation.
pub const ORG_ANNOTATION: &str = "imid_org";

/// Called with the verified claims after a successful authentication.
pub type AnnotateFn = Arc<dyn Fn(&RequestContext, &Claims) + Send + Sync>;

/// Record the subject as the trace user and the organisation as
/// [`ORG_ANNOTATION`].
pub fn annotate_identity(ctx: &RequestContext, claims: &Claims) {
    annotations::set_user(ctx, &claims.sub);
    annotations::add_annotation(ctx, ORG_ANNOTATION, claims.org.as_str());
}

/// Extract the bearer token from an `Authorization` header.
///
/// The scheme is matched case-insensitively. A missing header, an empty
/// token or another scheme all count as no token.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::NoToken)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::NoToken)?;
    if token.is_empty() || !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::NoToken);
    }

    Ok(token)
}

/// Validates bearer tokens and records the outcome on a request context.
#[derive(Clone)]
pub struct Authenticator {
    validator: TokenValidator,
    annotate: AnnotateFn,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(validator: TokenValidator) -> Self {
        Self {
            validator,
            annotate: Arc::new(annotate_identity),
        }
    }

    /// Replace the default identity annotations.
    pub fn with_annotations(
        mut self,
        annotate: impl Fn(&RequestContext, &Claims) + Send + Sync + 'static,
    ) -> Self {
        self.annotate = Arc::new(annotate);
        self
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Validate the access token in `headers`.
    pub async fn verify(&self, headers: &HeaderMap) -> Result<AuthInfo, AuthError> {
        let token = bearer_token(headers)?;
        let claims = self.validator.validate_access_token(token).await?;
        Ok(AuthInfo {
            access_token: token.to_string(),
            claims,
        })
    }

    /// Authenticate and derive a context carrying the outcome.
    ///
    /// Without headers the outcome is [`AuthError::NoToken`].
    pub async fn authenticate_context(
        &self,
        ctx: &RequestContext,
        headers: Option<&HeaderMap>,
    ) -> RequestContext {
        let result = match headers {
            Some(headers) => self.verify(headers).await,
            None => Err(AuthError::NoToken),
        };

        match &result {
            Ok(info) => (self.annotate)(ctx, &info.claims),
            Err(err) => debug!(error_code = err.error_code(), "Request not authenticated"),
        }

        context::attach(ctx, result)
    }
}

/// Middleware populating the request context with the authentication result.
pub async fn authenticate(
    State(authenticator): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    let ctx = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default();
    let headers = request.headers().clone();

    let ctx = authenticator.authenticate_context(&ctx, Some(&headers)).await;
    request.extensions_mut().insert(ctx);

    next.run(request).await
}
