//! `AuthUser` extractor: resolves the calling user from an API key.
//!
//! The key is read from `Authorization: Bearer` first, then `X-API-Key`.
//! Only SHA-256 digests live in `api_keys`; each row names the user the key
//! acts as, and every handler scopes its queries to that user.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use sqlx::Row;

use crate::http::error::AppError;
use crate::state::AppState;

/// Prefix of generated API keys.
pub const API_KEY_PREFIX: &str = "sf_";

/// The user an authenticated request acts as.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = extract_api_key(parts)?;

        let row = sqlx::query("SELECT id, user_id FROM api_keys WHERE key_hash = ?")
            .bind(hash_api_key(&presented))
            .fetch_optional(&state.db_pool.reader)
            .await
            .map_err(|e| AppError::Internal(format!("api key lookup failed: {e}")))?
            .ok_or_else(|| AppError::Unauthorized("unknown API key".to_string()))?;

        let key_id: String = row.get("id");
        if let Err(e) = sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(&key_id)
            .execute(&state.db_pool.writer)
            .await
        {
            tracing::debug!(key_id = %key_id, error = %e, "could not touch api key");
        }

        Ok(AuthUser {
            user_id: row.get("user_id"),
        })
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, AppError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| AppError::Unauthorized(format!("{name} header is not valid ASCII")))
        })
        .transpose()
}

fn extract_api_key(parts: &Parts) -> Result<String, AppError> {
    let bearer = header_str(parts, "authorization")?.and_then(|v| v.strip_prefix("Bearer "));
    let key = match bearer {
        Some(key) => Some(key),
        None => header_str(parts, "x-api-key")?,
    };

    key.map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            AppError::Unauthorized(
                "API key required (Authorization: Bearer <key> or X-API-Key)".to_string(),
            )
        })
}

/// Lowercase hex SHA-256 of a key, as stored in `api_keys.key_hash`.
pub fn hash_api_key(key: &str) -> String {
    hex_digest(&Sha256::digest(key.as_bytes()))
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Generate a new API key for `user_id` and store its hash.
///
/// Returns the plaintext key; it is never stored and cannot be shown again.
pub async fn create_api_key(state: &AppState, user_id: &str, name: &str) -> anyhow::Result<String> {
    let key = format!("{API_KEY_PREFIX}{}", uuid::Uuid::new_v4().simple());

    sqlx::query(
        "INSERT INTO api_keys (id, user_id, name, key_hash, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::now_v7().to_string())
    .bind(user_id)
    .bind(name)
    .bind(hash_api_key(&key))
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&state.db_pool.writer)
    .await?;

    tracing::info!(user_id, name, "API key created");
    Ok(key)
}

/// Whether any API key exists at all.
pub async fn has_api_keys(state: &AppState) -> anyhow::Result<bool> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys")
        .fetch_one(&state.db_pool.reader)
        .await?;
    Ok(count > 0)
}
