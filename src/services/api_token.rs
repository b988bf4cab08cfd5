//! REST API keys. Only a SHA-256 digest of each key is stored; the raw key is
//! handed to the client once, at login or registration.

use crate::models::User;
use crate::services::auth;
use crate::Database;
use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use rusqlite::OptionalExtension;
use sha2::{Digest, Sha256};

const TOKEN_PREFIX: &str = "ak_";
const TOKEN_BYTE_LENGTH: usize = 32;

fn generate_raw_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTE_LENGTH];
    rand::thread_rng().fill(&mut bytes);
    format!("{}{}", TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
}

fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Short display form, e.g. `ak_Xy12ab34...`.
fn extract_prefix(raw: &str) -> String {
    let without_prefix = raw.strip_prefix(TOKEN_PREFIX).unwrap_or(raw);
    let end = without_prefix.len().min(8);
    format!("{}{}...", TOKEN_PREFIX, &without_prefix[..end])
}

/// Issues a new key for `user_id` and returns the raw key.
pub fn create_token(db: &Database, user_id: i64) -> Result<String> {
    let raw_token = generate_raw_token();
    let conn = db.get()?;
    conn.execute(
        "INSERT INTO api_tokens (user_id, token_hash, prefix) VALUES (?1, ?2, ?3)",
        rusqlite::params![user_id, hash_token(&raw_token), extract_prefix(&raw_token)],
    )?;
    Ok(raw_token)
}

/// Resolves a raw key to its (active) user and stamps `last_used_at`.
pub fn validate_token(db: &Database, raw_token: &str) -> Result<Option<User>> {
    if !raw_token.starts_with(TOKEN_PREFIX) {
        return Ok(None);
    }

    let conn = db.get()?;
    let found: Option<(i64, i64)> = conn
        .query_row(
            "SELECT id, user_id FROM api_tokens WHERE token_hash = ?",
            [hash_token(raw_token)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((token_id, user_id)) = found else {
        return Ok(None);
    };

    conn.execute(
        "UPDATE api_tokens SET last_used_at = CURRENT_TIMESTAMP WHERE id = ?",
        [token_id],
    )?;

    Ok(auth::get_user_with(&conn, user_id)?.filter(|u| u.is_active))
}

pub fn revoke_token(db: &Database, raw_token: &str) -> Result<bool> {
    let conn = db.get()?;
    let affected = conn.execute(
        "DELETE FROM api_tokens WHERE token_hash = ?",
        [hash_token(raw_token)],
    )?;
    Ok(affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserType;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn setup_test_db() -> Database {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let db = Database::open_memory(&format!("api_token_test_{}", id)).unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn test_token_resolves_to_user_until_revoked() {
        let db = setup_test_db();
        let user_id =
            auth::create_user(&db, "ann@example.com", "Ann", "Password123", UserType::Student)
                .unwrap();

        let key = create_token(&db, user_id).unwrap();
        assert!(key.starts_with(TOKEN_PREFIX));

        let user = validate_token(&db, &key).unwrap().unwrap();
        assert_eq!(user.id, user_id);

        assert!(revoke_token(&db, &key).unwrap());
        assert!(validate_token(&db, &key).unwrap().is_none());
    }

    #[test]
    fn test_unknown_or_malformed_token_is_rejected() {
        let db = setup_test_db();
        assert!(validate_token(&db, "not-a-key").unwrap().is_none());
        assert!(validate_token(&db, "ak_doesnotexist").unwrap().is_none());
    }

    #[test]
    fn test_prefix_is_shortened() {
        assert_eq!(extract_prefix("ak_abcdefghijkl"), "ak_abcdefgh...");
        assert_eq!(extract_prefix("ak_abc"), "ak_abc...");
    }
}
