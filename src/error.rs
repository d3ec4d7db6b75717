// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! RPC error type returned by hooks and handlers.

use std::collections::BTreeMap;
use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;

/// Twirp error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Canceled,
    Unknown,
    InvalidArgument,
    Malformed,
    DeadlineExceeded,
    NotFound,
    BadRoute,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Canceled => "canceled",
            ErrorCode::Unknown => "unknown",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Malformed => "malformed",
            ErrorCode::DeadlineExceeded => "deadline_exceeded",
            ErrorCode::NotFound => "not_found",
            ErrorCode::BadRoute => "bad_route",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::ResourceExhausted => "resource_exhausted",
            ErrorCode::FailedPrecondition => "failed_precondition",
            ErrorCode::Aborted => "aborted",
            ErrorCode::OutOfRange => "out_of_range",
            ErrorCode::Unimplemented => "unimplemented",
            ErrorCode::Internal => "internal",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::DataLoss => "data_loss",
        }
    }

    /// HTTP status a server responds with for this code.
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::Canceled | ErrorCode::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
            ErrorCode::InvalidArgument | ErrorCode::Malformed | ErrorCode::OutOfRange => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::NotFound | ErrorCode::BadRoute => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyExists | ErrorCode::Aborted => StatusCode::CONFLICT,
            ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            ErrorCode::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Unknown | ErrorCode::Internal | ErrorCode::DataLoss => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error response from an RPC method or hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {msg}")]
pub struct RpcError {
    pub code: ErrorCode,
    pub msg: String,
    pub meta: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct RpcErrorBody<'a> {
    code: ErrorCode,
    msg: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    meta: &'a BTreeMap<String, String>,
}

impl RpcError {
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, msg)
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// The error a response was built from, if it came from an `RpcError`.
    pub fn from_response(response: &Response) -> Option<&RpcError> {
        response.extensions().get::<RpcError>()
    }
}

impl From<AuthError> for RpcError {
    fn from(err: AuthError) -> Self {
        let code = match &err {
            AuthError::NoToken | AuthError::InvalidToken(_) => ErrorCode::Unauthenticated,
            AuthError::InsufficientPermissions => ErrorCode::PermissionDenied,
            AuthError::KeySetUnavailable(_) => ErrorCode::Unavailable,
            AuthError::NotAuthenticated => ErrorCode::Internal,
        };
        let msg = match code {
            ErrorCode::Unauthenticated => "Unauthenticated".to_string(),
            _ => err.to_string(),
        };
        RpcError::new(code, msg).with_meta("reason", err.error_code())
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let body = Json(RpcErrorBody {
            code: self.code,
            msg: &self.msg,
            meta: &self.meta,
        });
        let mut response = (self.http_status(), body).into_response();
        response.extensions_mut().insert(self);
        response
    }
}
