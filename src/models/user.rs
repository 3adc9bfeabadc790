//! User model and related types

use serde::{Deserialize, Serialize};
use validator::Validate;

/// User roles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// User as persisted in users.json. `password` always holds a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub id_card: String,
    #[serde(default)]
    pub role: Role,
}

/// Registration request (plaintext password, hashed before storage)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(length(min = 1, message = "Username must not be empty"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password must not be empty"))]
    pub password: String,
    #[validate(length(min = 1, message = "Contact must not be empty"))]
    pub contact: String,
    #[validate(length(min = 1, message = "ID card number must not be empty"))]
    pub id_card: String,
    #[serde(default)]
    pub role: Role,
}

/// User summary for listings, without the password digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserShort {
    pub username: String,
    pub contact: String,
    /// ID card number with all but the last four characters masked
    pub id_card: String,
    pub role: Role,
}

impl From<&User> for UserShort {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            contact: user.contact.clone(),
            id_card: mask_id_card(&user.id_card),
            role: user.role,
        }
    }
}

fn mask_id_card(id_card: &str) -> String {
    let len = id_card.chars().count();
    if len <= 4 {
        return id_card.to_string();
    }
    id_card
        .chars()
        .enumerate()
        .map(|(i, c)| if i + 4 < len { '*' } else { c })
        .collect()
}

/// Identity of the caller, held by the front end after authentication.
///
/// This is a copy of the account, not a reference to it: deleting the account
/// does not touch an existing session, see [`DeleteOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub username: String,
    pub role: Role,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for Session {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            role: user.role,
        }
    }
}

/// Result of deleting users
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// Usernames actually removed, in store order
    pub removed: Vec<String>,
    /// The caller's own account was among the removed ones
    pub session_invalidated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("user".parse::<Role>(), Ok(Role::User));
        assert!("librarian".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_defaults_to_user() {
        let user: User = serde_json::from_str(r#"{"username":"ann","password":"x"}"#).unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.contact, "");
    }

    #[test]
    fn test_mask_id_card() {
        assert_eq!(mask_id_card("110101199001011234"), "**************1234");
        assert_eq!(mask_id_card("123"), "123");
    }
}
