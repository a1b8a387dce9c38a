//! Inbound credential verification.
//!
//! Keys are presented as `Authorization: Bearer <key>` and checked against
//! the read-only [`ApiKeyTable`]. Audit events carry a truncated SHA-256
//! fingerprint of the credential, never the raw value, and the caller-facing
//! message for unknown and disabled keys is identical.

use actix_web::http::header;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::ApiKeyTable;
use crate::error::AuthError;

/// The authenticated identity behind a validated credential. The display
/// name is used only for logging, never in response content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
}

/// Extract the bearer token from an Authorization header, if present.
pub fn bearer_token(headers: &header::HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| {
            let s = s.trim();
            if s.len() >= 7 && s[..6].eq_ignore_ascii_case("bearer") {
                Some(s[6..].trim().to_string())
            } else {
                None
            }
        })
        .filter(|s| !s.is_empty())
}

/// Non-reversible fingerprint of a credential, safe for audit logs.
pub fn fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Validate a presented credential against the key table.
pub fn authenticate(
    table: &ApiKeyTable,
    credential: Option<&str>,
) -> Result<Principal, AuthError> {
    let Some(token) = credential.filter(|s| !s.trim().is_empty()) else {
        warn!("authentication failed: no credential presented");
        return Err(AuthError::Missing);
    };

    let key_fingerprint = fingerprint(token);
    match table.lookup(token) {
        None => {
            warn!(%key_fingerprint, "authentication failed: unknown API key");
            Err(AuthError::NotFound)
        }
        Some(record) if !record.enabled => {
            warn!(
                %key_fingerprint,
                api_key = %record.name,
                "authentication failed: API key disabled"
            );
            Err(AuthError::Disabled)
        }
        Some(record) => {
            debug!(%key_fingerprint, api_key = %record.name, "authenticated");
            Ok(Principal {
                name: record.name.clone(),
            })
        }
    }
}
