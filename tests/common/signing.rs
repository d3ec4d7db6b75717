// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing keys and token minting, shared by the unit tests (through
//! `testutil`) and the integration tests. The including module must have
//! `Claims` and `TOKEN_TYPE_ACCESS_TOKEN` in scope.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::{pkcs8::DecodePrivateKey, traits::PublicKeyParts, RsaPrivateKey};
use serde::Serialize;
use serde_json::{json, Value};

use super::{Claims, TOKEN_TYPE_ACCESS_TOKEN};

const PRIMARY_PEM: &str = include_str!("../fixtures/signing_key_primary.pem");
const ROGUE_PEM: &str = include_str!("../fixtures/signing_key_rogue.pem");

/// An RSA private key with the key id it is published under.
pub struct TestSigner {
    pub kid: String,
    pem: &'static str,
}

pub fn primary_signer() -> TestSigner {
    TestSigner {
        kid: "test-key-primary".to_string(),
        pem: PRIMARY_PEM,
    }
}

pub fn rogue_signer() -> TestSigner {
    TestSigner {
        kid: "test-key-rogue".to_string(),
        pem: ROGUE_PEM,
    }
}

impl TestSigner {
    /// The public half as a JWK published for `alg`.
    pub fn jwk(&self, alg: &str) -> Value {
        let key = RsaPrivateKey::from_pkcs8_pem(self.pem).expect("fixture key parses");
        json!({
            "kty": "RSA",
            "use": "sig",
            "alg": alg,
            "kid": self.kid,
            "n": URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        })
    }

    pub fn sign(&self, alg: Algorithm, claims: &impl Serialize) -> String {
        self.sign_with_kid(alg, &self.kid, claims)
    }

    pub fn sign_with_kid(&self, alg: Algorithm, kid: &str, claims: &impl Serialize) -> String {
        let mut header = Header::new(alg);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(self.pem.as_bytes()).expect("fixture key loads");
        encode(&header, claims, &key).expect("token signs")
    }
}

/// A JWKS document as the identity service publishes it.
pub fn jwks_document(keys: Vec<Value>) -> Value {
    json!({ "keys": keys, "maxTokenTTL": 604800 })
}

/// Access token claims valid for the next hour.
pub fn access_claims(org: &str, sub: &str) -> Claims {
    let now = chrono::Utc::now().timestamp();
    Claims {
        sub: sub.to_string(),
        org: org.to_string(),
        token_type: TOKEN_TYPE_ACCESS_TOKEN.to_string(),
        iat: Some(now),
        exp: Some(now + 3600),
        ..Claims::default()
    }
}
