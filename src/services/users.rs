//! User management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::user::{CreateUser, DeleteOutcome, Session, User, UserShort},
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
}

impl UsersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Register a new account
    pub fn register(&self, data: CreateUser) -> AppResult<UserShort> {
        let data = CreateUser {
            username: data.username.trim().to_string(),
            ..data
        };
        data.validate()?;

        let mut directory = self.repository.users.load();
        if directory.contains(&data.username) {
            return Err(AppError::DuplicateKey(format!("Username {} already exists", data.username)));
        }

        let user = User {
            password: self.hash_password(&data.password)?,
            username: data.username,
            contact: data.contact,
            id_card: data.id_card,
            role: data.role,
        };
        let summary = UserShort::from(&user);
        directory.insert(user)?;
        self.repository.users.save(&directory)?;

        tracing::info!("User registered: {} ({})", summary.username, summary.role);
        Ok(summary)
    }

    /// Check a username and password and open a session
    pub fn authenticate(&self, username: &str, password: &str) -> AppResult<Session> {
        let directory = self.repository.users.load();
        let user = directory.get(username.trim()).ok_or(AppError::InvalidCredentials)?;

        if !self.verify_password(user, password) {
            tracing::warn!("Failed login attempt for {}", user.username);
            return Err(AppError::InvalidCredentials);
        }

        tracing::debug!("User {} authenticated", user.username);
        Ok(Session::from(user))
    }

    /// Delete accounts. The outcome tells the caller whether its own account went with them.
    pub fn delete_users<S: AsRef<str>>(&self, usernames: &[S], active: &Session) -> AppResult<DeleteOutcome> {
        let mut directory = self.repository.users.load();
        let outcome = directory.delete(usernames, active);
        if !outcome.removed.is_empty() {
            self.repository.users.save(&directory)?;
        }

        tracing::info!(
            "Users deleted by {}: {}",
            active.username,
            if outcome.removed.is_empty() {
                "none".to_string()
            } else {
                outcome.removed.join(", ")
            }
        );
        if outcome.session_invalidated {
            tracing::warn!("Active user {} deleted their own account", active.username);
        }
        Ok(outcome)
    }

    /// List accounts without their password digests
    pub fn list(&self) -> Vec<UserShort> {
        self.repository.users.load().summaries()
    }

    /// Verify user password. Digests that are not Argon2 PHC strings never match.
    fn verify_password(&self, user: &User, password: &str) -> bool {
        match PasswordHash::new(&user.password) {
            Ok(parsed_hash) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok(),
            Err(_) => {
                tracing::warn!("Stored password of {} is not a valid digest", user.username);
                false
            }
        }
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }
}
