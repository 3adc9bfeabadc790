//! Users repository: the in-memory account list and its persistence

use std::collections::HashSet;

use crate::{
    error::{AppError, AppResult},
    models::user::{DeleteOutcome, Session, User, UserShort},
    storage::{self, Storage},
};

#[derive(Clone)]
pub struct UsersRepository {
    storage: Storage,
}

impl UsersRepository {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn load(&self) -> UserDirectory {
        UserDirectory::new(storage::load_json(&self.storage.users_path()))
    }

    pub fn save(&self, directory: &UserDirectory) -> AppResult<()> {
        storage::save_json(&self.storage.users_path(), directory.users())
    }
}

/// Accounts keyed by username
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: Vec<User>,
}

impl UserDirectory {
    pub fn new(users: Vec<User>) -> Self {
        Self { users }
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.get(username).is_some()
    }

    /// Append a user whose password is already a digest
    pub fn insert(&mut self, user: User) -> AppResult<()> {
        if self.contains(&user.username) {
            return Err(AppError::DuplicateKey(format!("Username {} already exists", user.username)));
        }
        self.users.push(user);
        Ok(())
    }

    /// Remove the given usernames and tell whether `active` was one of them
    pub fn delete<S: AsRef<str>>(&mut self, usernames: &[S], active: &Session) -> DeleteOutcome {
        let targets: HashSet<&str> = usernames.iter().map(|u| AsRef::<str>::as_ref(u)).collect();

        let mut outcome = DeleteOutcome::default();
        self.users.retain(|u| {
            if targets.contains(u.username.as_str()) {
                outcome.removed.push(u.username.clone());
                false
            } else {
                true
            }
        });
        outcome.session_invalidated = outcome.removed.iter().any(|u| *u == active.username);
        outcome
    }

    pub fn summaries(&self) -> Vec<UserShort> {
        self.users.iter().map(UserShort::from).collect()
    }

    /// Append users with an unknown username. Returns (added, skipped).
    pub fn merge(&mut self, users: Vec<User>) -> (usize, usize) {
        let mut known: HashSet<String> = self.users.iter().map(|u| u.username.clone()).collect();
        let (mut added, mut skipped) = (0, 0);
        for user in users {
            if known.insert(user.username.clone()) {
                self.users.push(user);
                added += 1;
            } else {
                skipped += 1;
            }
        }
        (added, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    fn user(username: &str, role: Role) -> User {
        User {
            username: username.to_string(),
            password: "digest".to_string(),
            contact: "555-0100".to_string(),
            id_card: "ID-0001".to_string(),
            role,
        }
    }

    #[test]
    fn test_insert_duplicate() {
        let mut directory = UserDirectory::default();
        directory.insert(user("ann", Role::User)).unwrap();
        assert!(matches!(directory.insert(user("ann", Role::Admin)), Err(AppError::DuplicateKey(_))));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_delete_active_user_invalidates_session() {
        let mut directory = UserDirectory::new(vec![user("root", Role::Admin), user("ann", Role::User), user("bob", Role::User)]);
        let active = Session::from(&user("root", Role::Admin));

        let outcome = directory.delete(&["root", "ghost"], &active);
        assert_eq!(outcome.removed, vec!["root"]);
        assert!(outcome.session_invalidated);
        assert_eq!(directory.len(), 2);
        assert!(!directory.contains("root"));
    }

    #[test]
    fn test_delete_other_users_keeps_session() {
        let mut directory = UserDirectory::new(vec![user("root", Role::Admin), user("ann", Role::User)]);
        let active = Session::from(&user("root", Role::Admin));

        let outcome = directory.delete(&["ann"], &active);
        assert_eq!(outcome.removed, vec!["ann"]);
        assert!(!outcome.session_invalidated);
    }

    #[test]
    fn test_merge_dedupes_by_username() {
        let mut directory = UserDirectory::new(vec![user("ann", Role::User)]);
        let incoming = vec![user("ann", Role::Admin), user("bob", Role::User), user("bob", Role::User)];
        assert_eq!(directory.merge(incoming.clone()), (1, 2));
        assert_eq!(directory.merge(incoming), (0, 3));
        assert_eq!(directory.get("ann").unwrap().role, Role::User);
    }
}
