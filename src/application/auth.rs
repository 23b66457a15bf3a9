//! Accounts, password verification and cookie sessions.
//!
//! Session tokens have the shape `ss_<prefix>_<secret>`. Only the prefix and
//! the SHA-256 of the secret are stored, so a leaked database row cannot be
//! replayed as a cookie.

use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordVerifier,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::forms::FormErrors;
use crate::application::repos::{
    CreateSessionParams, CreateUserParams, RepoError, SessionsRepo, UsersRepo,
};
use crate::domain::entities::UserRecord;
use crate::domain::users::{validate_password, validate_username};

pub const SESSION_COOKIE: &str = "scrivo_session";
const TOKEN_PREFIX: &str = "ss";
const MIN_SECRET_LEN: usize = 32;

pub const DUPLICATE_USERNAME_MESSAGE: &str = "A user with that username already exists.";
pub const PASSWORD_MISMATCH_MESSAGE: &str = "The two password fields didn't match.";
pub const INVALID_LOGIN_MESSAGE: &str = "Please enter a correct username and password. Note that both fields may be case-sensitive.";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("invalid account data: {0}")]
    Validation(String),
}

/// The authenticated requester, attached to requests by the session middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

impl From<&UserRecord> for CurrentUser {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignupSubmission {
    pub username: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug)]
pub enum SignupOutcome {
    Created(UserRecord),
    Invalid(FormErrors),
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub async fn signup(&self, submission: SignupSubmission) -> Result<SignupOutcome, AuthError> {
        let mut errors = FormErrors::new();
        let username = submission.username.trim().to_string();

        if let Err(message) = validate_username(&username) {
            errors.add("username", message);
        } else if self.users.find_by_username(&username).await?.is_some() {
            errors.add("username", DUPLICATE_USERNAME_MESSAGE);
        }

        if let Err(message) = validate_password(&submission.password1) {
            errors.add("password1", message);
        }
        if submission.password2.is_empty() {
            errors.add("password2", "This field is required.");
        } else if submission.password1 != submission.password2 {
            errors.add("password2", PASSWORD_MISMATCH_MESSAGE);
        }

        if let Err(errors) = errors.into_result() {
            return Ok(SignupOutcome::Invalid(errors));
        }

        match self.insert_user(username, &submission.password1).await {
            Ok(user) => Ok(SignupOutcome::Created(user)),
            Err(AuthError::Repo(RepoError::Duplicate { .. })) => {
                let mut errors = FormErrors::new();
                errors.add("username", DUPLICATE_USERNAME_MESSAGE);
                Ok(SignupOutcome::Invalid(errors))
            }
            Err(err) => Err(err),
        }
    }

    /// Create an account outside the signup form (operator CLI).
    pub async fn create_user(&self, username: &str, password: &str) -> Result<UserRecord, AuthError> {
        validate_username(username).map_err(|reason| AuthError::Validation(reason.to_string()))?;
        validate_password(password).map_err(|reason| AuthError::Validation(reason.to_string()))?;
        self.insert_user(username.to_string(), password).await
    }

    /// Check credentials. Unknown users and wrong passwords are indistinguishable.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        let Some(user) = self.users.find_by_username(username.trim()).await? else {
            return Ok(None);
        };
        if verify_password(password.to_string(), user.password_hash.clone()).await? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    pub async fn open_session(&self, user_id: i64) -> Result<IssuedSession, AuthError> {
        let now = OffsetDateTime::now_utc();
        let pruned = self.sessions.delete_expired(now).await?;
        if pruned > 0 {
            debug!(target = "scrivo::auth", pruned, "expired sessions removed");
        }

        let prefix = generate_prefix();
        let secret = generate_secret();
        let token = format!("{TOKEN_PREFIX}_{prefix}_{secret}");
        let expires_at = now + self.session_ttl;

        self.sessions
            .create_session(CreateSessionParams {
                user_id,
                prefix,
                hashed_secret: hash_secret(&secret),
                expires_at,
            })
            .await?;

        Ok(IssuedSession { token, expires_at })
    }

    /// Resolve a cookie token into the user it belongs to.
    pub async fn resolve(&self, token: &str) -> Result<Option<CurrentUser>, AuthError> {
        let Some((_, user_id)) = self.verify_token(token).await? else {
            return Ok(None);
        };
        let user = self.users.find_user(user_id).await?;
        Ok(user.as_ref().map(CurrentUser::from))
    }

    pub async fn close_session(&self, token: &str) -> Result<(), AuthError> {
        if let Some((session_id, user_id)) = self.verify_token(token).await? {
            self.sessions.delete_session(session_id).await?;
            info!(target = "scrivo::auth", user_id, "session closed");
        }
        Ok(())
    }

    async fn verify_token(&self, token: &str) -> Result<Option<(Uuid, i64)>, AuthError> {
        let Some(parsed) = parse_token(token) else {
            return Ok(None);
        };
        let Some(record) = self.sessions.find_by_prefix(&parsed.prefix).await? else {
            return Ok(None);
        };

        if record.expires_at <= OffsetDateTime::now_utc() {
            self.sessions.delete_session(record.id).await?;
            return Ok(None);
        }

        let hashed_input = hash_secret(&parsed.secret);
        if record.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Ok(None);
        }

        Ok(Some((record.id, record.user_id)))
    }

    async fn insert_user(&self, username: String, password: &str) -> Result<UserRecord, AuthError> {
        let password_hash = hash_password(password.to_string()).await?;
        let user = self
            .users
            .create_user(CreateUserParams {
                username,
                password_hash,
            })
            .await?;
        info!(target = "scrivo::auth", user_id = user.id, username = %user.username, "user registered");
        Ok(user)
    }
}

async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AuthError::Hash(err.to_string()))
    })
    .await
    .map_err(|err| AuthError::Hash(err.to_string()))?
}

async fn verify_password(password: String, stored: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored).map_err(|err| AuthError::Hash(err.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|err| AuthError::Hash(err.to_string()))?
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

fn generate_prefix() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn parse_token(token: &str) -> Option<ParsedToken> {
    let mut parts = token.splitn(3, '_');
    if parts.next()? != TOKEN_PREFIX {
        return None;
    }
    let prefix = parts.next()?;
    let secret = parts.next()?;
    if secret.len() < MIN_SECRET_LEN || prefix.is_empty() {
        return None;
    }
    Some(ParsedToken {
        prefix: prefix.to_string(),
        secret: secret.to_string(),
    })
}

struct ParsedToken {
    prefix: String,
    secret: String,
}

/// Accept only same-site absolute paths as post-login destinations.
pub fn safe_next_path(next: Option<&str>) -> Option<String> {
    let next = next?.trim();
    if !next.starts_with('/') || next.starts_with("//") || next.contains('\\') {
        return None;
    }
    Some(next.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_token_requires_prefix_tag_and_long_secret() {
        let secret = "a".repeat(MIN_SECRET_LEN);
        assert!(parse_token(&format!("ss_abc_{secret}")).is_some());
        assert!(parse_token(&format!("sk_abc_{secret}")).is_none());
        assert!(parse_token("ss_abc_short").is_none());
        assert!(parse_token(&format!("ss__{secret}")).is_none());
    }

    #[test]
    fn secrets_hash_deterministically() {
        assert_eq!(hash_secret("one"), hash_secret("one"));
        assert_ne!(hash_secret("one"), hash_secret("two"));
    }

    #[test]
    fn safe_next_rejects_offsite_targets() {
        assert_eq!(safe_next_path(Some("/create/")), Some("/create/".to_string()));
        assert_eq!(safe_next_path(Some("//evil.example")), None);
        assert_eq!(safe_next_path(Some("https://evil.example/")), None);
        assert_eq!(safe_next_path(None), None);
    }

    #[tokio::test]
    async fn password_hash_round_trip() {
        let hash = hash_password("correct horse".to_string()).await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong horse".to_string(), hash).await.unwrap());
    }
}
