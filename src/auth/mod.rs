// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-token authentication against an identity service that publishes
//! its RSA signing keys as a JWKS.
//!
//! ## Auth Flow
//!
//! 1. Caller sends `Authorization: Bearer <access token>`
//! 2. Server:
//!    - Fetches the JWKS from `<IMAS_URL>/v1/jwks` and caches it with a TTL
//!    - Checks algorithm and token type, resolves the key by `kid`
//!    - Verifies the signature, then `exp`/`iat`/`nbf`
//! 3. The outcome is recorded in the request context as an [`AuthState`];
//!    handlers decide whether to reject.
//!
//! ## Security
//!
//! - Only RS256, RS384 and RS512 are accepted
//! - Claims are never returned before the signature check passes
//! - Clock skew tolerance is 60 seconds by default

pub mod claims;
pub mod clock;
pub mod context;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;
pub mod validator;

pub use claims::{Claims, TOKEN_TYPE_ACCESS_TOKEN, TOKEN_TYPE_ID_TOKEN};
pub use context::{attach, get_auth, outgoing_bearer, read, AuthInfo, AuthState};
pub use error::{AuthError, InvalidTokenReason, KeySourceError, TokenError};
pub use extractor::{Auth, OptionalAuth};
pub use jwks::{jwks_endpoint, JwksManager, KeySource};
pub use middleware::{authenticate, Authenticator};
pub use validator::TokenValidator;
