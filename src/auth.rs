// 🔐 Authentication - staff accounts, password hashing, sessions
//
// The authenticated principal is an explicit value handed to every
// operation that checks a role; nothing reads ambient session state.

use crate::db::{self, UserRow};
use crate::error::{AppError, AppResult};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{info, warn};

const INVALID_CREDENTIALS: &str = "Invalid username or password.";

// ============================================================================
// ROLE + PRINCIPAL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    /// Non-admin office staff
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }

    /// Parse a role submitted on a form. Only the two canonical names.
    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "staff" => Some(Role::Staff),
            _ => None,
        }
    }

    /// Role stored on a user row. Anything that is not "admin" (including
    /// the older "official"/"user" names) is staff.
    pub fn from_stored(value: &str) -> Role {
        if value.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Staff
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated user acting on a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            warn!(user = %self.username, "admin-only action refused");
            Err(AppError::Forbidden)
        }
    }
}

impl From<&UserRow> for Principal {
    fn from(user: &UserRow) -> Self {
        Principal {
            user_id: user.id,
            username: user.username.clone(),
            role: Role::from_stored(&user.role),
        }
    }
}

// ============================================================================
// PASSWORDS
// ============================================================================

/// Argon2 PHC string with a fresh random salt
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Persistence(format!("password hashing failed: {e}")))
}

/// False for a wrong password and for an unparseable stored hash
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// ============================================================================
// USERS
// ============================================================================

/// Create a staff or admin account
pub fn create_user(conn: &Connection, username: &str, password: &str, role: Role) -> AppResult<i64> {
    let username = username.trim();
    let name_len = username.chars().count();
    if !(2..=50).contains(&name_len) {
        return Err(AppError::invalid("Username must be between 2 and 50 characters."));
    }
    if password.chars().count() < 6 {
        return Err(AppError::invalid("Password must be at least 6 characters."));
    }

    let password_hash = hash_password(password)?;
    let id = db::insert_user(conn, username, &password_hash, role.as_str()).map_err(|e| match e {
        AppError::Conflict(_) => AppError::conflict(format!(
            "Username '{username}' already exists. Please choose a different one."
        )),
        other => other,
    })?;

    info!(user = username, role = %role, "user account created");
    Ok(id)
}

/// Check credentials. Unknown user and wrong password fail the same way.
pub fn authenticate(conn: &Connection, username: &str, password: &str) -> AppResult<Principal> {
    let user = db::find_user_by_username(conn, username.trim())?;
    verify_login(user.as_ref(), username, password)
}

/// Password check against an already fetched account row. Needs no
/// connection, so callers can release the database before hashing.
pub fn verify_login(user: Option<&UserRow>, username: &str, password: &str) -> AppResult<Principal> {
    match user {
        Some(user) if verify_password(password, &user.password_hash) => Ok(Principal::from(user)),
        _ => {
            warn!(user = username.trim(), "failed login");
            Err(AppError::Unauthenticated(INVALID_CREDENTIALS.to_string()))
        }
    }
}

/// Seed the first admin when no account exists yet. Returns true if created.
pub fn ensure_bootstrap_admin(conn: &Connection, username: &str, password: &str) -> AppResult<bool> {
    if db::count_users(conn)? > 0 {
        return Ok(false);
    }

    create_user(conn, username, password, Role::Admin)?;
    warn!(
        user = username,
        "created bootstrap admin account; change its password before going live"
    );
    Ok(true)
}

// ============================================================================
// SESSIONS
// ============================================================================

/// Only the digest of a session token is stored
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Start a session and return the raw token for the cookie
pub fn start_session(
    conn: &Connection,
    principal: &Principal,
    now: DateTime<Utc>,
    ttl: Duration,
) -> AppResult<String> {
    let token = uuid::Uuid::new_v4().to_string();
    db::insert_session(conn, &token_digest(&token), principal.user_id, now, now + ttl)?;

    let removed = db::delete_expired_sessions(conn, now)?;
    if removed > 0 {
        info!(removed, "pruned expired sessions");
    }

    Ok(token)
}

/// Principal for a session token. Missing or expired → Unauthenticated.
pub fn resolve_session(conn: &Connection, token: &str, now: DateTime<Utc>) -> AppResult<Principal> {
    let digest = token_digest(token);
    let session = db::find_session(conn, &digest)?
        .ok_or_else(|| AppError::Unauthenticated("Please log in to continue.".to_string()))?;

    if session.expires_at <= now {
        db::delete_session(conn, &digest)?;
        return Err(AppError::Unauthenticated(
            "Your session has expired. Please log in again.".to_string(),
        ));
    }

    Ok(Principal {
        user_id: session.user_id,
        username: session.username,
        role: Role::from_stored(&session.role),
    })
}

pub fn end_session(conn: &Connection, token: &str) -> AppResult<()> {
    db::delete_session(conn, &token_digest(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("s3cret!").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret!", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret!", "not-a-hash"));
    }

    #[test]
    fn test_create_and_authenticate() {
        let conn = test_db();
        create_user(&conn, "bursar", "password1", Role::Admin).unwrap();

        let principal = authenticate(&conn, "bursar", "password1").unwrap();
        assert_eq!(principal.username, "bursar");
        assert!(principal.is_admin());

        assert!(matches!(
            authenticate(&conn, "bursar", "nope"),
            Err(AppError::Unauthenticated(_))
        ));
        assert!(matches!(
            authenticate(&conn, "ghost", "password1"),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_verify_login_without_connection() {
        let conn = test_db();
        create_user(&conn, "clerk", "clerk-pass", Role::Staff).unwrap();
        let row = db::find_user_by_username(&conn, "clerk").unwrap();
        drop(conn);

        let principal = verify_login(row.as_ref(), "clerk", "clerk-pass").unwrap();
        assert_eq!(principal.role, Role::Staff);
        assert!(matches!(
            verify_login(row.as_ref(), "clerk", "wrong"),
            Err(AppError::Unauthenticated(_))
        ));
        assert!(matches!(
            verify_login(None, "ghost", "clerk-pass"),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_create_user_validation_and_conflict() {
        let conn = test_db();
        assert!(matches!(
            create_user(&conn, "a", "password1", Role::Staff),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            create_user(&conn, "clerk", "12345", Role::Staff),
            Err(AppError::InvalidInput(_))
        ));

        create_user(&conn, "clerk", "123456", Role::Staff).unwrap();
        assert!(matches!(
            create_user(&conn, "clerk", "abcdef", Role::Admin),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_bootstrap_admin_only_once() {
        let conn = test_db();
        assert!(ensure_bootstrap_admin(&conn, "admin", "admin1").unwrap());
        assert!(!ensure_bootstrap_admin(&conn, "admin", "admin1").unwrap());
        assert_eq!(db::count_users(&conn).unwrap(), 1);
    }

    #[test]
    fn test_role_names() {
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse("staff"), Some(Role::Staff));
        assert_eq!(Role::parse("root"), None);
        assert_eq!(Role::from_stored("official"), Role::Staff);
        assert_eq!(Role::from_stored("user"), Role::Staff);
    }

    #[test]
    fn test_staff_cannot_act_as_admin() {
        let staff = Principal {
            user_id: 2,
            username: "clerk".to_string(),
            role: Role::Staff,
        };
        assert!(matches!(staff.require_admin(), Err(AppError::Forbidden)));
    }

    #[test]
    fn test_session_lifecycle() {
        let conn = test_db();
        create_user(&conn, "clerk", "123456", Role::Staff).unwrap();
        let principal = authenticate(&conn, "clerk", "123456").unwrap();
        let now = Utc::now();

        let token = start_session(&conn, &principal, now, Duration::hours(2)).unwrap();
        assert_eq!(resolve_session(&conn, &token, now).unwrap(), principal);

        // Expired when resolved after the TTL
        let later = now + Duration::hours(3);
        assert!(matches!(
            resolve_session(&conn, &token, later),
            Err(AppError::Unauthenticated(_))
        ));

        let token = start_session(&conn, &principal, now, Duration::hours(2)).unwrap();
        end_session(&conn, &token).unwrap();
        assert!(resolve_session(&conn, &token, now).is_err());
    }
}
