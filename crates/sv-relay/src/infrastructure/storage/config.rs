//! TOML configuration for the relay.
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! working relay on port 4321 with certificates read from `./certs`.
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 4321
//! certs_dir = "certs"
//! handshake_timeout_secs = 10
//! buffer_size = 5242880
//! mode = "proxy"            # or "echo"
//!
//! [sessions]
//! client_timeout_secs = 120 # unclaimed streamers are dropped after this
//! check_interval_secs = 1
//!
//! [credentials]
//! bcrypt_cost = 12
//!
//! [[credentials.users]]             # written by `sv-relay add-user`
//! email = "alice@example.com"
//! password_hash = "$2b$12$..."
//!
//! [[credentials.users]]             # hashed at startup; avoid outside testing
//! email = "bob@example.com"
//! password = "change-me"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` take `some_fn()`
//! when absent, so older or partial files keep loading as fields are added.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sv_core::DEFAULT_BUFFER_SIZE;
use thiserror::Error;

use crate::application::registry::RegistryConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("user '{0}' must set exactly one of `password` or `password_hash`")]
    UserSecret(String),

    #[error("user with '{0}' email already exists")]
    DuplicateUser(String),
}

/// What authenticated sessions do with their frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Pair streamers with viewers and bridge them.
    Proxy,
    /// Answer every frame with a greeting. Useful for testing clients.
    Echo,
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// IP address to bind to. `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding `cert.pem` and `key.pem`.
    #[serde(default = "default_certs_dir")]
    pub certs_dir: PathBuf,
    /// Seconds a client has to finish the TLS handshake.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Per-connection receive buffer; also the largest accepted frame.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_mode")]
    pub mode: SessionMode,
}

/// Registry timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionsConfig {
    #[serde(default = "default_client_timeout_secs")]
    pub client_timeout_secs: u64,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

/// Users allowed to log in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialsConfig {
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserEntry {
    pub email: String,
    /// Plain-text password, hashed when the relay starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// bcrypt hash, used as is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
}

/// The one secret a [`UserEntry`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSecret<'a> {
    Plain(&'a str),
    Hashed(&'a str),
}

impl UserEntry {
    pub fn with_password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Some(password.into()),
            password_hash: None,
        }
    }

    pub fn with_hash(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: None,
            password_hash: Some(password_hash.into()),
        }
    }

    /// # Errors
    ///
    /// [`ConfigError::UserSecret`] unless exactly one of the two fields is set.
    pub fn secret(&self) -> Result<UserSecret<'_>, ConfigError> {
        match (&self.password, &self.password_hash) {
            (Some(password), None) => Ok(UserSecret::Plain(password)),
            (None, Some(hash)) => Ok(UserSecret::Hashed(hash)),
            _ => Err(ConfigError::UserSecret(self.email.clone())),
        }
    }
}

impl CredentialsConfig {
    pub fn contains_user(&self, email: &str) -> bool {
        self.users.iter().any(|user| user.email == email)
    }

    /// Appends a user with an already-hashed password.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateUser`] if the email is already listed.
    pub fn add_hashed_user(&mut self, email: &str, password_hash: String) -> Result<(), ConfigError> {
        if self.contains_user(email) {
            return Err(ConfigError::DuplicateUser(email.to_string()));
        }
        self.users.push(UserEntry::with_hash(email, password_hash));
        Ok(())
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    4321
}
fn default_certs_dir() -> PathBuf {
    PathBuf::from("certs")
}
fn default_handshake_timeout_secs() -> u64 {
    10
}
fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}
fn default_mode() -> SessionMode {
    SessionMode::Proxy
}
fn default_client_timeout_secs() -> u64 {
    120
}
fn default_check_interval_secs() -> u64 {
    1
}
fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            certs_dir: default_certs_dir(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            buffer_size: default_buffer_size(),
            mode: default_mode(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            client_timeout_secs: default_client_timeout_secs(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: default_bcrypt_cost(),
            users: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Socket address built from `bind_address` and `port`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidAddress`] if `bind_address` is not an IP.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let text = format!("{}:{}", self.server.bind_address, self.server.port);
        text.parse().map_err(|_| ConfigError::InvalidAddress(text))
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            client_timeout: Duration::from_secs(self.sessions.client_timeout_secs),
            check_interval: Duration::from_secs(self.sessions.check_interval_secs),
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.server.handshake_timeout_secs)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads the config at `path`, returning `RelayConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path` as pretty TOML. Comments in an existing file
/// are not preserved.
///
/// # Errors
///
/// [`ConfigError::Io`] or [`ConfigError::Serialize`].
pub fn save_config(config: &RelayConfig, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_listens_on_4321() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.server.port, 4321);
        assert_eq!(cfg.bind_addr().unwrap().to_string(), "0.0.0.0:4321");
    }

    #[test]
    fn test_default_config_timings() {
        let cfg = RelayConfig::default();
        let registry = cfg.registry_config();
        assert_eq!(registry.client_timeout, Duration::from_secs(120));
        assert_eq!(registry.check_interval, Duration::from_secs(1));
        assert_eq!(cfg.handshake_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_default_config_uses_proxy_mode_and_5mib_buffer() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.server.mode, SessionMode::Proxy);
        assert_eq!(cfg.server.buffer_size, 5 * 1024 * 1024);
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let cfg: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, RelayConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        // Arrange
        let text = r#"
            [server]
            port = 9000
            mode = "echo"

            [[credentials.users]]
            email = "alice@example.com"
            password = "pw"
        "#;

        // Act
        let cfg: RelayConfig = toml::from_str(text).unwrap();

        // Assert
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.mode, SessionMode::Echo);
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
        assert_eq!(cfg.sessions.client_timeout_secs, 120);
        assert_eq!(cfg.credentials.users.len(), 1);
        assert_eq!(cfg.credentials.users[0].email, "alice@example.com");
    }

    #[test]
    fn test_user_entries_accept_a_hash_or_a_password() {
        // Arrange
        let text = r#"
            [[credentials.users]]
            email = "alice@example.com"
            password_hash = "$2b$12$abc"

            [[credentials.users]]
            email = "bob@example.com"
            password = "pw"
        "#;

        // Act
        let cfg: RelayConfig = toml::from_str(text).unwrap();

        // Assert
        let users = &cfg.credentials.users;
        assert_eq!(users[0].secret().unwrap(), UserSecret::Hashed("$2b$12$abc"));
        assert_eq!(users[1].secret().unwrap(), UserSecret::Plain("pw"));
    }

    #[test]
    fn test_user_entry_needs_exactly_one_secret() {
        let both = UserEntry {
            email: "a@example.com".into(),
            password: Some("pw".into()),
            password_hash: Some("$2b$".into()),
        };
        let neither = UserEntry {
            email: "b@example.com".into(),
            password: None,
            password_hash: None,
        };

        assert!(matches!(both.secret(), Err(ConfigError::UserSecret(ref e)) if e == "a@example.com"));
        assert!(matches!(neither.secret(), Err(ConfigError::UserSecret(_))));
    }

    #[test]
    fn test_add_hashed_user_rejects_duplicate_email() {
        let mut section = CredentialsConfig::default();
        section.add_hashed_user("a@example.com", "$2b$first".into()).unwrap();

        let err = section.add_hashed_user("a@example.com", "$2b$second".into()).unwrap_err();

        assert!(matches!(err, ConfigError::DuplicateUser(_)));
        assert_eq!(section.users.len(), 1);
    }

    #[test]
    fn test_hashed_user_is_saved_without_a_password_field() {
        let mut cfg = RelayConfig::default();
        cfg.credentials.add_hashed_user("a@example.com", "$2b$04$x".into()).unwrap();

        let text = toml::to_string_pretty(&cfg).unwrap();

        assert!(text.contains("password_hash"));
        assert!(!text.contains("password ="));
    }

    #[test]
    fn test_unknown_mode_is_a_parse_error() {
        let result: Result<RelayConfig, _> = toml::from_str("[server]\nmode = \"mirror\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_bind_address_is_reported() {
        let mut cfg = RelayConfig::default();
        cfg.server.bind_address = "not.an.ip".to_string();
        assert!(matches!(cfg.bind_addr(), Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn test_load_config_missing_file_returns_default() {
        let path = std::env::temp_dir().join("sv-relay-does-not-exist.toml");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg, RelayConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        // Arrange
        let path = std::env::temp_dir().join(format!("sv-relay-config-{}.toml", std::process::id()));
        let mut cfg = RelayConfig::default();
        cfg.server.port = 7777;
        cfg.sessions.check_interval_secs = 0;
        cfg.credentials.users.push(UserEntry::with_password("bob@example.com", "secret"));
        cfg.credentials
            .add_hashed_user("carol@example.com", "$2b$04$hash".into())
            .unwrap();

        // Act
        save_config(&cfg, &path).unwrap();
        let loaded = load_config(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_config_reports_malformed_toml() {
        let path = std::env::temp_dir().join(format!("sv-relay-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[server\nport = ").unwrap();

        let err = load_config(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
        std::fs::remove_file(&path).ok();
    }
}
