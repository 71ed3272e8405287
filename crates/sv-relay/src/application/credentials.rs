//! User credential storage for the relay's login step.
//!
//! The relay only needs two questions answered: "add this user" when the
//! configuration is loaded, and "is this password right?" when a peer sends
//! `LOGIN`. [`CredentialStore`] is the seam; [`InMemoryCredentialStore`] is
//! the implementation the binary seeds from `[[credentials.users]]`.
//! Entries written by `sv-relay add-user` already carry a bcrypt hash and go
//! in through [`InMemoryCredentialStore::add_user_with_hash`] unchanged.
//!
//! # Password hashing (for beginners)
//!
//! Passwords are never kept in plain text. `bcrypt` turns each one into a
//! salted hash that embeds its own cost factor, so checking a password later
//! only needs the stored hash:
//!
//! ```text
//! add_user("a@x", "pw")      ─▶ users["a@x"] = "$2b$12$<salt><hash>"
//! authenticate("a@x", "pw")  ─▶ bcrypt::verify("pw", users["a@x"]) ─▶ true
//! ```
//!
//! Hashing is deliberately slow. Callers on an async runtime should run
//! [`CredentialStore::authenticate`] on a blocking thread.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

/// Errors raised while adding users.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("user with '{0}' email already exists")]
    DuplicateUser(String),

    #[error("failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("stored password for '{0}' is not a bcrypt hash")]
    InvalidHash(String),
}

/// `true` for the 60-character `$2?$NN$<salt+hash>` form bcrypt produces.
pub fn is_bcrypt_hash(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 60
        && bytes.starts_with(b"$2")
        && matches!(bytes[2], b'a' | b'b' | b'x' | b'y')
        && bytes[3] == b'$'
        && bytes[4].is_ascii_digit()
        && bytes[5].is_ascii_digit()
        && bytes[6] == b'$'
        && bytes[7..]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'.' || *b == b'/')
}

/// Source of truth for who may log in to the relay.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    /// Adds a user. Fails if the email is already taken.
    fn add_user(&self, email: &str, password: &str) -> Result<(), CredentialError>;

    /// Returns `true` when `email` exists and `password` matches its hash.
    fn authenticate(&self, email: &str, password: &str) -> bool;
}

/// Thread-safe email → bcrypt hash map.
pub struct InMemoryCredentialStore {
    users: Mutex<HashMap<String, String>>,
    cost: u32,
}

impl InMemoryCredentialStore {
    /// Creates an empty store hashing with [`bcrypt::DEFAULT_COST`].
    pub fn new() -> Self {
        Self::with_cost(bcrypt::DEFAULT_COST)
    }

    /// Creates an empty store hashing with the given bcrypt cost (4..=31).
    pub fn with_cost(cost: u32) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            cost,
        }
    }

    pub fn len(&self) -> usize {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a user whose password was hashed elsewhere, without re-hashing.
    ///
    /// # Errors
    ///
    /// [`CredentialError::InvalidHash`] if `hash` is not a bcrypt hash, or
    /// [`CredentialError::DuplicateUser`] if the email is taken.
    pub fn add_user_with_hash(&self, email: &str, hash: &str) -> Result<(), CredentialError> {
        if !is_bcrypt_hash(hash) {
            return Err(CredentialError::InvalidHash(email.to_string()));
        }
        self.insert_hash(email, hash.to_string())
    }

    fn insert_hash(&self, email: &str, hash: String) -> Result<(), CredentialError> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        match users.entry(email.to_string()) {
            Entry::Occupied(_) => Err(CredentialError::DuplicateUser(email.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(hash);
                debug!("added user {email}");
                Ok(())
            }
        }
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn add_user(&self, email: &str, password: &str) -> Result<(), CredentialError> {
        if self
            .users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(email)
        {
            return Err(CredentialError::DuplicateUser(email.to_string()));
        }

        // Hash without holding the lock; the entry check below catches a
        // concurrent insert of the same email.
        let hash = bcrypt::hash(password, self.cost)?;
        self.insert_hash(email, hash)
    }

    fn authenticate(&self, email: &str, password: &str) -> bool {
        let hash = match self
            .users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(email)
        {
            Some(hash) => hash.clone(),
            None => return false,
        };
        bcrypt::verify(password, &hash).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // bcrypt's minimum cost keeps the tests fast.
    const TEST_COST: u32 = 4;

    #[test]
    fn test_authenticate_accepts_correct_password() {
        // Arrange
        let store = InMemoryCredentialStore::with_cost(TEST_COST);
        store.add_user("alice@example.com", "hunter2").unwrap();

        // Act / Assert
        assert!(store.authenticate("alice@example.com", "hunter2"));
    }

    #[test]
    fn test_authenticate_rejects_wrong_password() {
        let store = InMemoryCredentialStore::with_cost(TEST_COST);
        store.add_user("alice@example.com", "hunter2").unwrap();

        assert!(!store.authenticate("alice@example.com", "hunter3"));
    }

    #[test]
    fn test_authenticate_rejects_unknown_user() {
        let store = InMemoryCredentialStore::with_cost(TEST_COST);
        assert!(!store.authenticate("nobody@example.com", ""));
    }

    #[test]
    fn test_add_user_rejects_duplicate_email() {
        // Arrange
        let store = InMemoryCredentialStore::with_cost(TEST_COST);
        store.add_user("bob@example.com", "one").unwrap();

        // Act
        let err = store.add_user("bob@example.com", "two").unwrap_err();

        // Assert: the first password still works, the error names the email
        assert!(matches!(err, CredentialError::DuplicateUser(ref e) if e == "bob@example.com"));
        assert_eq!(err.to_string(), "user with 'bob@example.com' email already exists");
        assert!(store.authenticate("bob@example.com", "one"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_passwords_are_not_stored_in_plain_text() {
        let store = InMemoryCredentialStore::with_cost(TEST_COST);
        store.add_user("carol@example.com", "plain").unwrap();

        let users = store.users.lock().unwrap();
        let stored = users.get("carol@example.com").unwrap();
        assert_ne!(stored, "plain");
        assert!(stored.starts_with("$2"));
    }

    #[test]
    fn test_concurrent_add_of_same_email_keeps_exactly_one() {
        let store = Arc::new(InMemoryCredentialStore::with_cost(TEST_COST));

        let successes = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let store = Arc::clone(&store);
                    scope.spawn(move || store.add_user("race@example.com", &format!("pw{i}")).is_ok())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(successes, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_prehashed_user_authenticates() {
        // Arrange
        let store = InMemoryCredentialStore::with_cost(TEST_COST);
        let hash = bcrypt::hash("from-the-config", TEST_COST).unwrap();

        // Act
        store.add_user_with_hash("dave@example.com", &hash).unwrap();

        // Assert: the stored value is the given hash, not a hash of it
        assert!(store.authenticate("dave@example.com", "from-the-config"));
        assert!(!store.authenticate("dave@example.com", &hash));
        assert_eq!(store.users.lock().unwrap()["dave@example.com"], hash);
    }

    #[test]
    fn test_prehashed_user_rejects_plain_text() {
        let store = InMemoryCredentialStore::with_cost(TEST_COST);

        let err = store.add_user_with_hash("eve@example.com", "hunter2").unwrap_err();

        assert!(matches!(err, CredentialError::InvalidHash(ref e) if e == "eve@example.com"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_prehashed_user_rejects_duplicate_email() {
        let store = InMemoryCredentialStore::with_cost(TEST_COST);
        store.add_user("frank@example.com", "one").unwrap();
        let hash = bcrypt::hash("two", TEST_COST).unwrap();

        let err = store.add_user_with_hash("frank@example.com", &hash).unwrap_err();

        assert!(matches!(err, CredentialError::DuplicateUser(_)));
        assert!(store.authenticate("frank@example.com", "one"));
    }

    #[test]
    fn test_is_bcrypt_hash() {
        let hash = bcrypt::hash("pw", TEST_COST).unwrap();
        assert!(is_bcrypt_hash(&hash));
        assert!(!is_bcrypt_hash("pw"));
        assert!(!is_bcrypt_hash(&hash[..59]));
        assert!(!is_bcrypt_hash(&hash.replacen("$2", "$3", 1)));
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = InMemoryCredentialStore::default();
        assert!(store.is_empty());
    }
}
