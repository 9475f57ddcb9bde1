use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{Duration, Utc};
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::{self, AppError};
use crate::models::lawyer::slot_config_string;
use crate::models::{LawyerProfile, Role, Specialization, User};
use crate::state::AppState;

/// Characters counted as "special" by the password rules.
const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

fn bearer_token(headers: &HeaderMap) -> &str {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    auth.strip_prefix("Bearer ").unwrap_or("")
}

fn new_session_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Sessions store a digest of the token, never the token itself.
fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Returns every password rule the candidate fails, in rule order.
pub fn password_errors(password: &str) -> Vec<&'static str> {
    let mut failed = Vec::new();
    if password.len() < 8 {
        failed.push("Minimum 8 characters.");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        failed.push("At least one uppercase letter.");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        failed.push("At least one lowercase letter.");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        failed.push("At least one number.");
    }
    if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        failed.push("At least one special character.");
    }
    failed
}

/// Creates a session row for the user and returns the raw token. The db
/// lock is taken here, so callers must not hold it.
pub fn issue_session(state: &AppState, user_id: &str) -> Result<String, AppError> {
    let token = new_session_token();
    let expires_at =
        (Utc::now() + Duration::minutes(state.config.session_ttl_minutes)).naive_utc();
    {
        let db = state.db.lock().unwrap();
        queries::create_session(&db, &hash_token(&token), user_id, &expires_at)?;
    }
    Ok(token)
}

pub fn authenticate_token(state: &AppState, token: &str) -> Result<User, AppError> {
    if token.is_empty() {
        return Err(AppError::Unauthenticated("Not authenticated".into()));
    }
    let user = {
        let db = state.db.lock().unwrap();
        queries::get_session_user(&db, &hash_token(token))?
    };
    user.ok_or_else(|| AppError::Unauthenticated("Not authenticated".into()))
}

/// Extractor for routes that require a signed-in account. Rejects with
/// 401 before the handler body runs.
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = authenticate_token(state, bearer_token(&parts.headers))?;
        Ok(CurrentUser(user))
    }
}

/// Seeds the configured admin account on first start. Self-registration
/// never produces admins, so without this there would be none.
pub fn ensure_admin(state: &AppState) -> anyhow::Result<()> {
    let db = state.db.lock().unwrap();
    if queries::find_admin(&db)?.is_some() {
        return Ok(());
    }

    let admin = User {
        id: Uuid::new_v4().to_string(),
        username: state.config.admin_username.clone(),
        name: Some("Administrator".to_string()),
        email: state.config.admin_email.clone(),
        role: Role::Admin,
        is_active: true,
    };
    let password_hash = hash_password(&state.config.admin_password)?;
    queries::create_user(&db, &admin, &password_hash)?;
    tracing::info!("seeded admin account {}", admin.username);
    Ok(())
}

// POST /api/auth/register
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "confirmPassword")]
    pub confirm_password: Option<String>,
    pub role: Option<String>,
    #[serde(alias = "lawyerProfile")]
    pub lawyer_profile: Option<RegisterLawyerProfile>,
}

#[derive(Deserialize)]
pub struct RegisterLawyerProfile {
    pub bio: Option<String>,
    pub specialization: Option<String>,
    #[serde(alias = "licenseNumber")]
    pub license_number: Option<String>,
    pub experience: Option<i64>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(alias = "availableSlots")]
    pub available_slots: Option<serde_json::Value>,
    pub fees: Option<i64>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let role = match body.role.as_deref().and_then(Role::registerable) {
        Some(role) => role,
        None => return Err(AppError::BadRequest("Invalid role".into())),
    };

    let username = body.username.as_deref().unwrap_or("").trim().to_string();
    let email = body.email.as_deref().unwrap_or("").trim().to_string();
    let password = body.password.as_deref().unwrap_or("");
    let confirm = body.confirm_password.as_deref().unwrap_or("");
    if username.is_empty() || email.is_empty() || password.is_empty() || confirm.is_empty() {
        return Err(AppError::BadRequest("All fields are required".into()));
    }

    let failed_rules = password_errors(password);
    if !failed_rules.is_empty() {
        return Err(AppError::BadRequest(failed_rules.join(", ")));
    }

    if password != confirm {
        return Err(AppError::BadRequest("Passwords do not match".into()));
    }

    // Lawyer details are validated before any row is written so a bad
    // profile cannot leave an orphaned account behind.
    let lawyer_fields = if role == Role::Lawyer {
        let profile = body.lawyer_profile.as_ref();
        let specialization_raw = profile
            .and_then(|p| p.specialization.as_deref())
            .unwrap_or("");
        let license_number = profile
            .and_then(|p| p.license_number.as_deref())
            .unwrap_or("")
            .trim()
            .to_string();
        if specialization_raw.is_empty() || license_number.is_empty() {
            return Err(AppError::BadRequest(
                "Specialization and license number are required for lawyer registration".into(),
            ));
        }
        let specialization = Specialization::parse(specialization_raw)
            .ok_or_else(|| AppError::BadRequest("Invalid specialization".into()))?;
        Some((specialization, license_number))
    } else {
        None
    };

    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.clone(),
        name: body.name.clone().filter(|n| !n.trim().is_empty()),
        email: email.clone(),
        role,
        is_active: true,
    };
    let password_hash = hash_password(password)?;

    {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        if queries::user_exists(&tx, &username, &email)? {
            return Err(AppError::BadRequest(
                "User with given email or username already exists".into(),
            ));
        }

        if let Err(e) = queries::create_user(&tx, &user, &password_hash) {
            if errors::is_unique_violation(&e) {
                return Err(AppError::BadRequest(
                    "User with given email or username already exists".into(),
                ));
            }
            return Err(e.into());
        }

        if let Some((specialization, license_number)) = &lawyer_fields {
            let details = body.lawyer_profile.as_ref();
            let profile = LawyerProfile {
                id: Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                bio: details.and_then(|p| p.bio.clone()),
                specialization: *specialization,
                license_number: license_number.clone(),
                experience: details.and_then(|p| p.experience).unwrap_or(0),
                city: details.and_then(|p| p.city.clone()),
                state: details.and_then(|p| p.state.clone()),
                available_slots: slot_config_string(
                    details.and_then(|p| p.available_slots.as_ref()),
                ),
                fees: details.and_then(|p| p.fees).unwrap_or(0),
                is_verified: false,
                is_active: true,
            };
            if let Err(e) = queries::save_lawyer_profile(&tx, &profile) {
                if errors::is_unique_violation(&e)
                    && errors::violation_mentions(&e, "license_number")
                {
                    return Err(AppError::Conflict(
                        "License number already registered".into(),
                    ));
                }
                return Err(e.into());
            }
        }

        tx.commit()?;
    }

    let token = issue_session(&state, &user.id)?;
    tracing::info!("registered {} account {}", role.as_str(), user.username);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "User registered successfully",
            "token": token,
            "user": user,
        })),
    ))
}

// POST /api/auth/login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let username = body.username.as_deref().unwrap_or("").trim();
    let password = body.password.as_deref().unwrap_or("");
    if username.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest("All fields are required".into()));
    }

    let found = {
        let db = state.db.lock().unwrap();
        queries::get_user_with_password(&db, username)?
    };
    let (user, stored_hash) = match found {
        Some(pair) => pair,
        None => {
            return Err(AppError::Unauthenticated(
                "Invalid username or password".into(),
            ))
        }
    };

    // Argon2 verification runs outside the db lock.
    if !verify_password(password, &stored_hash) || !user.is_active {
        return Err(AppError::Unauthenticated(
            "Invalid username or password".into(),
        ));
    }

    let token = issue_session(&state, &user.id)?;
    tracing::info!("user {} logged in", user.username);

    Ok(Json(serde_json::json!({ "token": token, "user": user })))
}

// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let token = bearer_token(&headers);
    if !token.is_empty() {
        let db = state.db.lock().unwrap();
        queries::delete_session(&db, &hash_token(token))?;
    }
    Ok(Json(serde_json::json!({ "message": "Logged out" })))
}

// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let lawyer_profile = if user.is_lawyer() {
        let db = state.db.lock().unwrap();
        queries::get_lawyer_profile(&db, &user.id)?
    } else {
        None
    };

    Ok(Json(serde_json::json!({
        "user": user,
        "lawyer_profile": lawyer_profile,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db;

    fn test_config() -> AppConfig {
        AppConfig {
            port: 0,
            database_url: ":memory:".to_string(),
            session_ttl_minutes: 60,
            rate_limit_per_hour: 100,
            admin_username: "admin".to_string(),
            admin_email: "admin@example.com".to_string(),
            admin_password: "Adm1n!pass".to_string(),
        }
    }

    fn test_state() -> AppState {
        let conn = db::init_db(":memory:").unwrap();
        AppState::new(conn, test_config())
    }

    fn seed_user(state: &AppState, username: &str) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            name: None,
            email: format!("{username}@example.com"),
            role: Role::User,
            is_active: true,
        };
        let db = state.db.lock().unwrap();
        queries::create_user(&db, &user, "x").unwrap();
        user
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("S3cret!pw").unwrap();
        assert_ne!(hash, "S3cret!pw");
        assert!(verify_password("S3cret!pw", &hash));
        assert!(!verify_password("S3cret!pw2", &hash));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_password("whatever", "not-a-phc-string"));
    }

    #[test]
    fn password_rules_catch_each_failure() {
        assert!(password_errors("Aa1!aaaa").is_empty());
        assert!(password_errors("Aa1!a").contains(&"Minimum 8 characters."));
        assert!(password_errors("aa1!aaaa").contains(&"At least one uppercase letter."));
        assert!(password_errors("AA1!AAAA").contains(&"At least one lowercase letter."));
        assert!(password_errors("Aaa!aaaa").contains(&"At least one number."));
        assert!(password_errors("Aa1aaaaa").contains(&"At least one special character."));
        assert_eq!(password_errors("").len(), 5);
    }

    #[test]
    fn session_tokens_are_hex_and_unique() {
        let a = new_session_token();
        let b = new_session_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn issue_then_authenticate_round_trip() {
        let state = test_state();
        let user = seed_user(&state, "carol");

        let token = issue_session(&state, &user.id).unwrap();
        let resolved = authenticate_token(&state, &token).unwrap();
        assert_eq!(resolved.id, user.id);

        assert!(authenticate_token(&state, "").is_err());
        assert!(authenticate_token(&state, "deadbeef").is_err());
    }

    #[test]
    fn expired_session_is_rejected() {
        let state = test_state();
        let user = seed_user(&state, "dave");

        let token = new_session_token();
        let expired = (Utc::now() - Duration::hours(1)).naive_utc();
        {
            let db = state.db.lock().unwrap();
            queries::create_session(&db, &hash_token(&token), &user.id, &expired).unwrap();
        }

        assert!(authenticate_token(&state, &token).is_err());
    }

    #[test]
    fn ensure_admin_seeds_once() {
        let state = test_state();
        ensure_admin(&state).unwrap();
        ensure_admin(&state).unwrap();

        let db = state.db.lock().unwrap();
        let admin = queries::find_admin(&db).unwrap().unwrap();
        assert_eq!(admin.username, "admin");

        let (_, hash) = queries::get_user_with_password(&db, "admin").unwrap().unwrap();
        assert!(verify_password("Adm1n!pass", &hash));
    }
}
