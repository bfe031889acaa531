//! Credential extraction from request headers

use axum::http::{HeaderMap, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::types::OrgId;

/// Decode `Basic <base64(user:password)>` into its two halves
///
/// The password may contain `:`; only the first one separates the pair.
pub fn decode_basic_auth(value: &str) -> Option<(String, String)> {
    let mut parts = value.split(' ');
    let (Some(scheme), Some(encoded), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    if scheme != "Basic" {
        return None;
    }

    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Token after `Bearer `, if any
pub fn bearer_token(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// First cookie named `name` across all `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Organization requested through `header_name`; `0` when absent or invalid
pub fn org_id_from_headers(headers: &HeaderMap, header_name: &str) -> OrgId {
    let Some(raw) = headers.get(header_name) else {
        return 0;
    };

    match raw.to_str().ok().and_then(|v| v.trim().parse::<OrgId>().ok()) {
        Some(id) => id,
        None => {
            tracing::debug!(header = header_name, value = ?raw, "Received invalid header");
            0
        }
    }
}
