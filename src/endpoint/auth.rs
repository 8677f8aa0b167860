use anyhow::{bail, Result};
use axum::http::HeaderMap;

use crate::config::Config;

/// Header the hosting runtime uses to forward the caller's access token.
pub const FORWARDED_TOKEN_HEADER: &str = "x-forwarded-access-token";

/// Resolve the bearer token for an upstream call: the forwarded per-request
/// token wins, the configured static token is the fallback.
pub fn resolve_token(headers: &HeaderMap, config: &Config) -> Result<String> {
    if let Some(value) = headers.get(FORWARDED_TOKEN_HEADER) {
        if let Ok(token) = value.to_str() {
            if !token.trim().is_empty() {
                return Ok(token.trim().to_string());
            }
        }
    }
    if let Some(token) = &config.token {
        if !token.is_empty() {
            return Ok(token.clone());
        }
    }
    bail!("no access token available: neither a forwarded token nor a configured one")
}
