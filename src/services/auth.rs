use crate::error::{FieldErrors, ServiceError};
use crate::models::{Registration, User, UserType};
use crate::Database;
use anyhow::Result;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use once_cell::sync::Lazy;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use rusqlite::{Connection, OptionalExtension};

pub const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_NAME_LENGTH: usize = 150;
const MAX_EMAIL_LENGTH: usize = 255;

pub const DUPLICATE_EMAIL: &str = "Email is either invalid or already taken";

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email regex pattern")
});

const USER_COLUMNS: &str = "id, email, name, password_hash, user_type, is_active, is_staff, is_superuser, last_login, date_joined";

/// Lowercases the domain part, leaving the local part untouched.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        anyhow::bail!("Email cannot be empty");
    }
    if email.len() > MAX_EMAIL_LENGTH {
        anyhow::bail!("Email must be {} characters or less", MAX_EMAIL_LENGTH);
    }
    if !EMAIL_REGEX.is_match(email) {
        anyhow::bail!("Enter a valid email address");
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        anyhow::bail!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        );
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        anyhow::bail!("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        anyhow::bail!("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        anyhow::bail!("Password must contain at least one number");
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String> {
    validate_password(password)?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$dW5rbm93bg$0000000000000000000000000000000000000000000";

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => {
            if let Ok(dummy) = PasswordHash::new(DUMMY_HASH) {
                let _ = Argon2::default().verify_password(password.as_bytes(), &dummy);
            }
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn email_taken(db: &Database, email: &str) -> Result<bool> {
    let conn = db.get()?;
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE email = ?",
        [normalize_email(email)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn insert_user(
    db: &Database,
    email: &str,
    name: &str,
    password: &str,
    user_type: UserType,
    is_superuser: bool,
) -> Result<i64> {
    let email = normalize_email(email);
    validate_email(&email).map_err(|e| ServiceError::invalid("email", e.to_string()))?;
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ServiceError::invalid(
            "name",
            format!("Name must be {} characters or less", MAX_NAME_LENGTH),
        )
        .into());
    }
    if email_taken(db, &email)? {
        return Err(ServiceError::invalid("email", DUPLICATE_EMAIL).into());
    }
    let password_hash =
        hash_password(password).map_err(|e| ServiceError::invalid("password", e.to_string()))?;

    let conn = db.get()?;
    conn.execute(
        "INSERT INTO users (email, name, password_hash, user_type, is_staff, is_superuser) VALUES (?, ?, ?, ?, ?, ?)",
        (
            &email,
            name.trim(),
            &password_hash,
            user_type.to_string(),
            is_superuser,
            is_superuser,
        ),
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!("Created {} account {}", user_type, email);
    Ok(id)
}

pub fn create_user(
    db: &Database,
    email: &str,
    name: &str,
    password: &str,
    user_type: UserType,
) -> Result<i64> {
    insert_user(db, email, name, password, user_type, false)
}

/// Staff + superuser account. Superusers can manage courses and the admin area.
pub fn create_superuser(db: &Database, email: &str, name: &str, password: &str) -> Result<i64> {
    insert_user(db, email, name, password, UserType::Instructor, true)
}

/// Validates a signup submission as a whole, reporting every failing field.
pub fn register(db: &Database, form: &Registration) -> Result<i64> {
    let mut errors = FieldErrors::new();
    let email = normalize_email(&form.email);

    if let Err(e) = validate_email(&email) {
        errors.add("email", e.to_string());
    } else if email_taken(db, &email)? {
        errors.add("email", DUPLICATE_EMAIL);
    }
    if form.name.trim().is_empty() {
        errors.add("name", "This field is required");
    } else if form.name.chars().count() > MAX_NAME_LENGTH {
        errors.add(
            "name",
            format!("Name must be {} characters or less", MAX_NAME_LENGTH),
        );
    }
    if let Err(e) = validate_password(&form.password1) {
        errors.add("password1", e.to_string());
    }
    if form.password1 != form.password2 {
        errors.add("password2", "The two password fields didn't match");
    }
    errors.into_result()?;

    create_user(db, &email, &form.name, &form.password1, form.user_type)
}

pub fn update_password(db: &Database, email: &str, password: &str) -> Result<()> {
    let password_hash = hash_password(password)?;
    let conn = db.get()?;
    let affected = conn.execute(
        "UPDATE users SET password_hash = ? WHERE email = ?",
        (&password_hash, normalize_email(email)),
    )?;
    if affected == 0 {
        return Err(ServiceError::NotFound("User").into());
    }
    Ok(())
}

pub fn authenticate(db: &Database, email: &str, password: &str) -> Result<Option<User>> {
    let user = get_user_by_email(db, email)?;

    match user {
        Some(u) if u.is_active && verify_password(password, &u.password_hash) => {
            let conn = db.get()?;
            conn.execute(
                "UPDATE users SET last_login = CURRENT_TIMESTAMP WHERE id = ?",
                [u.id],
            )?;
            Ok(Some(u))
        }
        Some(_) => Ok(None),
        None => {
            // Keep timing comparable to a real verification.
            verify_password(password, DUMMY_HASH);
            Ok(None)
        }
    }
}

pub fn create_session(db: &Database, user_id: i64, duration_days: i64) -> Result<String> {
    let token = generate_session_token();
    let conn = db.get()?;
    conn.execute(
        "INSERT INTO sessions (user_id, token, expires_at) VALUES (?, ?, datetime('now', ?||' days'))",
        (user_id, &token, duration_days),
    )?;
    Ok(token)
}

pub fn validate_session(db: &Database, token: &str) -> Result<Option<User>> {
    let conn = db.get()?;
    let sql = format!(
        "SELECT {} FROM users u JOIN sessions s ON s.user_id = u.id WHERE s.token = ? AND s.expires_at > datetime('now') AND u.is_active = 1",
        prefixed_user_columns("u")
    );
    let user = conn.query_row(&sql, [token], row_to_user).optional()?;
    Ok(user)
}

pub fn delete_session(db: &Database, token: &str) -> Result<()> {
    let conn = db.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?", [token])?;
    Ok(())
}

pub fn cleanup_expired_sessions(db: &Database) -> Result<usize> {
    let conn = db.get()?;
    let removed = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )?;
    Ok(removed)
}

pub fn has_users(db: &Database) -> Result<bool> {
    let conn = db.get()?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count > 0)
}

/// All users, or only one type: the `Student` / `Instructor` views.
pub fn list_users(db: &Database, user_type: Option<UserType>) -> Result<Vec<User>> {
    let conn = db.get()?;
    let users = match user_type {
        Some(t) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users WHERE user_type = ? ORDER BY date_joined DESC, id DESC",
                USER_COLUMNS
            ))?;
            let rows = stmt
                .query_map([t.to_string()], row_to_user)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users ORDER BY date_joined DESC, id DESC",
                USER_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], row_to_user)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(users)
}

pub fn list_students(db: &Database) -> Result<Vec<User>> {
    list_users(db, Some(UserType::Student))
}

pub fn list_instructors(db: &Database) -> Result<Vec<User>> {
    list_users(db, Some(UserType::Instructor))
}

pub fn get_user(db: &Database, id: i64) -> Result<Option<User>> {
    let conn = db.get()?;
    get_user_with(&conn, id)
}

pub(crate) fn get_user_with(conn: &Connection, id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
            [id],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user_by_email(db: &Database, email: &str) -> Result<Option<User>> {
    let conn = db.get()?;
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS),
            [normalize_email(email)],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn delete_user_by_email(db: &Database, email: &str) -> Result<bool> {
    let conn = db.get()?;
    let affected = conn.execute(
        "DELETE FROM users WHERE email = ?",
        [normalize_email(email)],
    )?;
    Ok(affected > 0)
}

fn prefixed_user_columns(alias: &str) -> String {
    USER_COLUMNS
        .split(", ")
        .map(|c| format!("{}.{}", alias, c))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        user_type: row
            .get::<_, String>(4)?
            .parse()
            .unwrap_or(UserType::Student),
        is_active: row.get(5)?,
        is_staff: row.get(6)?,
        is_superuser: row.get(7)?,
        last_login: row.get(8)?,
        date_joined: row.get(9)?,
    })
}
