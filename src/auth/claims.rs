// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access token claims and permission checks.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};

/// Token type of access tokens (`ntt` claim).
pub const TOKEN_TYPE_ACCESS_TOKEN: &str = "access_token";

/// Token type of identity tokens (`ntt` claim).
pub const TOKEN_TYPE_ID_TOKEN: &str = "id_token";

/// Claims carried by an identity-service token.
///
/// Registered claims are optional on the wire; `exp`, `iat` and `nbf` are
/// only enforced when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(default)]
    pub sub: String,

    /// Organisation the subject acts on behalf of
    #[serde(default)]
    pub org: String,

    /// Token type, e.g. [`TOKEN_TYPE_ACCESS_TOKEN`]
    #[serde(default, rename = "ntt")]
    pub token_type: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub permissions: PermissionsClaim,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub groups: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo: Option<Userinfo>,

    /// Expiration timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not before timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience, either a string or a list of strings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Name and contact details of the subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Userinfo {
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub picture: String,
}

/// Permissions the holder has organisation-wide and per unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsClaim {
    #[serde(default, deserialize_with = "null_as_default")]
    pub org: BTreeSet<String>,
    #[serde(default, deserialize_with = "nullable_units")]
    pub units: BTreeMap<String, BTreeSet<String>>,
}

/// Issuers may encode empty lists and maps as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_units<'de, D>(deserializer: D) -> Result<BTreeMap<String, BTreeSet<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let units: Option<BTreeMap<String, Option<BTreeSet<String>>>> =
        Option::deserialize(deserializer)?;
    Ok(units
        .unwrap_or_default()
        .into_iter()
        .map(|(unit, perms)| (unit, perms.unwrap_or_default()))
        .collect())
}

impl PermissionsClaim {
    /// Permissions held in the organisation.
    pub fn in_organisation(&self) -> BTreeSet<&str> {
        self.org.iter().map(String::as_str).collect()
    }

    /// Permissions held in a unit, either directly or inherited from the
    /// organisation.
    pub fn in_unit(&self, unit: &str) -> BTreeSet<&str> {
        let mut perms = self.in_organisation();
        if let Some(unit_perms) = self.units.get(unit) {
            perms.extend(unit_perms.iter().map(String::as_str));
        }
        perms
    }
}

impl Claims {
    /// Check that the holder has every one of `permissions` in `unit`.
    pub fn has_permissions_in_unit(&self, unit: &str, permissions: &[&str]) -> bool {
        let held = self.permissions.in_unit(unit);
        permissions.iter().all(|p| held.contains(p))
    }

    /// Check that the holder has every one of `permissions` organisation-wide.
    pub fn has_permissions_in_organisation(&self, permissions: &[&str]) -> bool {
        let held = self.permissions.in_organisation();
        permissions.iter().all(|p| held.contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claims() -> Claims {
        serde_json::from_value(serde_json::json!({
            "sub": "hms-govt://agent/007",
            "org": "hms-govt",
            "ntt": "access_token",
            "exp": 1700003600,
            "permissions": {
                "org": ["permission-to-kill"],
                "units": {"mi6": ["access-building", "read-files"]}
            }
        }))
        .unwrap()
    }

    #[test]
    fn deserializes_token_type_from_ntt() {
        let claims = sample_claims();
        assert_eq!(claims.token_type, TOKEN_TYPE_ACCESS_TOKEN);
        assert_eq!(claims.exp, Some(1700003600));
        assert_eq!(claims.iat, None);
    }

    #[test]
    fn unit_permissions_include_organisation_permissions() {
        let claims = sample_claims();
        assert!(claims.has_permissions_in_unit("mi6", &["access-building", "permission-to-kill"]));
        assert!(claims.has_permissions_in_unit("mi5", &["permission-to-kill"]));
        assert!(!claims.has_permissions_in_unit("mi5", &["read-files"]));
    }

    #[test]
    fn organisation_permissions_do_not_include_unit_permissions() {
        let claims = sample_claims();
        assert!(claims.has_permissions_in_organisation(&["permission-to-kill"]));
        assert!(!claims.has_permissions_in_organisation(&["read-files"]));
    }

    #[test]
    fn empty_requirement_is_satisfied() {
        assert!(Claims::default().has_permissions_in_unit("any", &[]));
    }

    #[test]
    fn null_collections_deserialize_as_empty() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "sub": "u",
            "ntt": "access_token",
            "groups": null,
            "userinfo": null,
            "permissions": {"units": {"mi6": null, "q": ["lab"]}, "org": null}
        }))
        .unwrap();
        assert!(claims.groups.is_empty());
        assert!(claims.userinfo.is_none());
        assert!(claims.permissions.org.is_empty());
        assert!(claims.permissions.units["mi6"].is_empty());
        assert!(claims.has_permissions_in_unit("q", &["lab"]));

        let claims: Claims =
            serde_json::from_str(r#"{"ntt":"access_token","permissions":null}"#).unwrap();
        assert_eq!(claims.permissions, PermissionsClaim::default());
    }

    #[test]
    fn missing_permissions_claim_defaults_to_empty() {
        let claims: Claims = serde_json::from_str(r#"{"sub":"u","ntt":"id_token"}"#).unwrap();
        assert!(claims.permissions.org.is_empty());
        assert!(!claims.has_permissions_in_organisation(&["x"]));
    }
}
