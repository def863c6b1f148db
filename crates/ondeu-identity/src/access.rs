//! Bearer token validation and role checks.
//!
//! Roles live in two places in a Keycloak access token:
//!
//! ```json
//! {
//!   "realm_access":    { "roles": ["offline_access"] },
//!   "resource_access": { "ondeu-front": { "roles": ["student"] } }
//! }
//! ```
//!
//! A caller is allowed through when any required role is present in either
//! place. Resource roles are inspected first.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde_json::Value;

use ondeu_core::defaults::DEFAULT_ROLE;
use ondeu_core::{Claims, Error, Identity, IdentityProvider, Result};

/// Extract the raw token from an `Authorization: Bearer ...` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| Error::Unauthenticated("authorization header is not present".to_string()))?
        .to_str()
        .map_err(|_| Error::Unauthenticated("authorization header is not valid text".to_string()))?;

    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => value.trim(),
    };

    if token.is_empty() {
        return Err(Error::Unauthenticated("bearer token is empty".to_string()));
    }
    Ok(token)
}

/// Decode and verify the request's bearer token.
pub async fn validate(provider: &dyn IdentityProvider, headers: &HeaderMap) -> Result<Claims> {
    let token = bearer_token(headers)?;
    provider.decode_token(token).await
}

fn role_list(value: &Value, location: &str) -> Result<Vec<String>> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::InvalidToken(format!("{} is not an object", location)))?;

    match object.get("roles") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|r| r.as_str().map(str::to_string))
            .collect()),
        Some(_) => Err(Error::InvalidToken(format!("{}.roles is not a list", location))),
    }
}

/// Roles from `realm_access.roles`.
pub fn realm_roles(claims: &Claims) -> Result<Vec<String>> {
    match claims.get("realm_access") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => role_list(value, "realm_access"),
    }
}

/// Roles per client from `resource_access.<client>.roles`.
pub fn resource_roles(claims: &Claims) -> Result<HashMap<String, Vec<String>>> {
    let access = match claims.get("resource_access") {
        None | Some(Value::Null) => return Ok(HashMap::new()),
        Some(value) => value
            .as_object()
            .ok_or_else(|| Error::InvalidToken("resource_access is not an object".to_string()))?,
    };

    access
        .iter()
        .map(|(client, value)| {
            let location = format!("resource_access.{}", client);
            Ok((client.clone(), role_list(value, &location)?))
        })
        .collect()
}

fn overlaps(required: &[String], actual: &[String]) -> bool {
    required.iter().any(|r| actual.contains(r))
}

/// Whether the claims carry at least one required role.
///
/// `Ok(false)` means the token is well formed but grants none of the roles.
pub fn check_access(
    claims: &Claims,
    required_realm_roles: &[String],
    required_resource_roles: &HashMap<String, Vec<String>>,
) -> Result<bool> {
    let resources = resource_roles(claims)?;
    for (client, required) in required_resource_roles {
        if let Some(actual) = resources.get(client) {
            if overlaps(required, actual) {
                return Ok(true);
            }
        }
    }

    let realm = realm_roles(claims)?;
    Ok(overlaps(required_realm_roles, &realm))
}

/// Read `sub` and `azp` from the claims.
pub fn identity_from_claims(claims: &Claims) -> Result<Identity> {
    let field = |name: &str| {
        claims
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    match (field("sub"), field("azp")) {
        (Some(user_id), Some(client_id)) => Ok(Identity { user_id, client_id }),
        _ => Err(Error::InvalidToken(
            "token missing required parameters".to_string(),
        )),
    }
}

/// Validate the request and require one of `roles` on `application`.
///
/// An empty role list falls back to the realm's default role.
pub async fn authorize(
    provider: &dyn IdentityProvider,
    headers: &HeaderMap,
    application: &str,
    roles: &[&str],
) -> Result<Identity> {
    let claims = validate(provider, headers).await?;

    let required: Vec<String> = if roles.is_empty() {
        vec![DEFAULT_ROLE.to_string()]
    } else {
        roles.iter().map(|r| r.to_string()).collect()
    };
    let resource = HashMap::from([(application.to_string(), required)]);

    if !check_access(&claims, &[], &resource)? {
        return Err(Error::AccessDenied("access denied".to_string()));
    }

    identity_from_claims(&claims)
}
