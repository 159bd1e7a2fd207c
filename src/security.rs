//! Bearer-token and destination-hostname gates
//!
//! Both gates are pure functions of the request and the process-wide
//! [`SecurityConfig`], evaluated before any browser resource is touched.

use crate::{CaptureError, CaptureOptions};
use serde::{Deserialize, Serialize};

pub const MISSING_AUTH_MESSAGE: &str = "Authorization header missing or invalid format";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid token";

/// Access control settings, read once at startup and never mutated.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// Bearer token every non-health request must present. `None` disables the gate.
    pub auth_token: Option<String>,

    /// Hostnames (and their subdomains) that may be captured. Empty allows any host.
    pub host_whitelist: Vec<String>,
}

impl SecurityConfig {
    pub fn new(auth_token: Option<String>, host_whitelist: Vec<String>) -> Self {
        Self {
            auth_token: auth_token.filter(|t| !t.is_empty()),
            host_whitelist: host_whitelist
                .into_iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Builds the config from raw environment-style values.
    pub fn from_raw(auth_token: Option<&str>, host_whitelist: Option<&str>) -> Self {
        Self::new(
            auth_token.map(str::to_string),
            host_whitelist.map(parse_host_whitelist).unwrap_or_default(),
        )
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth_token.is_some()
    }

    /// Bearer-auth gate. A no-op when no token is configured.
    pub fn check_auth(&self, authorization: Option<&str>) -> Result<(), CaptureError> {
        match self.auth_token.as_deref() {
            Some(expected) => validate_bearer_token(authorization, expected),
            None => Ok(()),
        }
    }

    /// Hostname allow-list gate.
    pub fn check_host(&self, options: &CaptureOptions) -> Result<(), CaptureError> {
        let host = options.hostname();
        if is_hostname_allowed(host, &self.host_whitelist) {
            Ok(())
        } else {
            Err(CaptureError::HostNotAllowed {
                host: host.to_string(),
                allowed: self.host_whitelist.clone(),
            })
        }
    }
}

/// Splits a comma-separated host list, dropping blanks.
pub fn parse_host_whitelist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

/// Checks an `Authorization` header value against the expected token.
///
/// Missing header or a scheme other than `Bearer ` yields 401; a present but
/// different token yields 403.
pub fn validate_bearer_token(
    authorization: Option<&str>,
    expected: &str,
) -> Result<(), CaptureError> {
    let Some(credentials) = authorization.and_then(|h| h.strip_prefix("Bearer ")) else {
        return Err(CaptureError::Unauthorized(MISSING_AUTH_MESSAGE.to_string()));
    };
    let token = credentials.split(' ').next().unwrap_or_default();
    if timing_safe_eq(token, expected) {
        Ok(())
    } else {
        Err(CaptureError::Forbidden(INVALID_TOKEN_MESSAGE.to_string()))
    }
}

/// Exact match or strict subdomain of an entry. An empty list allows everything.
pub fn is_hostname_allowed(hostname: &str, whitelist: &[String]) -> bool {
    if whitelist.is_empty() {
        return true;
    }
    if hostname.is_empty() {
        return false;
    }
    whitelist.iter().any(|allowed| {
        hostname == allowed
            || hostname
                .strip_suffix(allowed.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Constant-time string equality.
pub fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
