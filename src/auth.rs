use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::config::{ApiKeyEntry, AuthConfig, Role};

/// Authenticated caller identity, available to handlers via request extensions.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub name: String,
    pub role: Role,
}

impl CallerIdentity {
    /// Identity given to every request when authentication is disabled.
    pub fn anonymous() -> Self {
        CallerIdentity {
            name: "anonymous".to_string(),
            role: Role::Admin,
        }
    }

    pub fn can_write(&self) -> bool {
        self.role.can_write()
    }
}

#[derive(Serialize)]
struct AuthError {
    success: bool,
    error: String,
}

fn unauthorized(error: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(AuthError {
            success: false,
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("X-API-Key")
        .or_else(|| headers.get(header::AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s))
}

/// Finds the first entry for `key`. Every entry is compared, each in
/// constant time, whether or not an earlier one matched.
fn lookup<'a>(keys: &'a [ApiKeyEntry], key: &str) -> Option<&'a ApiKeyEntry> {
    keys.iter().fold(None, |found, entry| {
        let matched: bool = entry.key.as_bytes().ct_eq(key.as_bytes()).into();
        match found {
            Some(_) => found,
            None if matched => Some(entry),
            None => None,
        }
    })
}

pub async fn auth_middleware<B>(
    Extension(config): Extension<Arc<AuthConfig>>,
    mut req: Request<B>,
    next: Next<B>,
) -> Response {
    if !config.enabled {
        req.extensions_mut().insert(CallerIdentity::anonymous());
        return next.run(req).await;
    }

    let Some(key) = presented_key(req.headers()) else {
        return unauthorized("Missing API key. Provide X-API-Key header or Authorization: Bearer <key>");
    };

    let Some(entry) = lookup(&config.api_keys, key) else {
        tracing::warn!("Invalid API key presented");
        return unauthorized("Invalid API key");
    };

    tracing::debug!(caller = %entry.name, role = %entry.role, "Authenticated request");
    let identity = CallerIdentity {
        name: entry.name.clone(),
        role: entry.role,
    };
    req.extensions_mut().insert(identity);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, key: &str, role: Role) -> ApiKeyEntry {
        ApiKeyEntry {
            name: name.to_string(),
            key: key.to_string(),
            role,
        }
    }

    #[test]
    fn test_presented_key_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(presented_key(&headers), Some("abc"));

        headers.insert("X-API-Key", "xyz".parse().unwrap());
        assert_eq!(presented_key(&headers), Some("xyz"));
    }

    #[test]
    fn test_lookup_and_roles() {
        let keys = vec![entry("loadgen", "w", Role::Writer), entry("dash", "r", Role::Reader)];

        assert_eq!(lookup(&keys, "w").map(|e| e.name.as_str()), Some("loadgen"));
        assert!(lookup(&keys, "nope").is_none());
        assert!(lookup(&keys, "").is_none());

        let shadowed = vec![entry("first", "k", Role::Reader), entry("second", "k", Role::Admin)];
        assert_eq!(lookup(&shadowed, "k").map(|e| e.name.as_str()), Some("first"));

        assert!(Role::Writer.can_write());
        assert!(Role::Admin.can_write());
        assert!(!Role::Reader.can_write());
        assert!(CallerIdentity::anonymous().can_write());
    }
}
