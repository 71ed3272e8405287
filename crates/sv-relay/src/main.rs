//! ScreenViewer relay: entry point.
//!
//! The relay terminates TLS, requires every peer to log in, hands each
//! registering streamer a one-time code, and when a viewer presents that code
//! bridges the two connections byte for byte.
//!
//! # Usage
//!
//! ```text
//! sv-relay [OPTIONS]
//! sv-relay [--config <PATH>] add-user <EMAIL> --password <PASSWORD>
//!
//! Commands:
//!   add-user  Store a bcrypt hash of PASSWORD for EMAIL in the config file
//!
//! Options:
//!   --config          <PATH>  TOML config file [default: sv-relay.toml]
//!   --bind            <IP>    Address to listen on (overrides the file)
//!   --port            <PORT>  Port to listen on (overrides the file)
//!   --certs-dir       <DIR>   Directory with cert.pem and key.pem
//!   --client-timeout  <SECS>  How long a code stays claimable
//!   --check-interval  <SECS>  How often expired codes are swept
//!   --mode            <MODE>  proxy | echo
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                  | Flag                  |
//! |---------------------------|-----------------------|
//! | `SV_RELAY_CONFIG`         | `--config`            |
//! | `SV_RELAY_BIND`           | `--bind`              |
//! | `SV_RELAY_PORT`           | `--port`              |
//! | `SV_RELAY_CERTS_DIR`      | `--certs-dir`         |
//! | `SV_RELAY_CLIENT_TIMEOUT` | `--client-timeout`    |
//! | `SV_RELAY_CHECK_INTERVAL` | `--check-interval`    |
//! | `SV_RELAY_MODE`           | `--mode`              |
//! | `SV_RELAY_NEW_PASSWORD`   | `add-user --password` |
//!
//! Flags win over the config file; a missing config file means defaults.

use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sv_relay::application::credentials::{CredentialStore, InMemoryCredentialStore};
use sv_relay::application::registry::SessionRegistry;
use sv_relay::infrastructure::storage::config::{
    load_config, save_config, CredentialsConfig, RelayConfig, SessionMode, UserSecret,
};
use sv_relay::infrastructure::{behavior_for, ListenerSettings, RelayServer, RelayServices};
use sv_transport::tls;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// ScreenViewer relay server.
#[derive(Debug, Parser)]
#[command(
    name = "sv-relay",
    about = "Authenticating TLS relay that pairs ScreenViewer streamers with viewers",
    version
)]
struct Cli {
    /// Path of the TOML config file. A missing file means all defaults.
    #[arg(long, default_value = "sv-relay.toml", env = "SV_RELAY_CONFIG")]
    config: PathBuf,

    /// IP address to listen on.
    #[arg(long, env = "SV_RELAY_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "SV_RELAY_PORT")]
    port: Option<u16>,

    /// Directory containing `cert.pem` and `key.pem`.
    #[arg(long, env = "SV_RELAY_CERTS_DIR")]
    certs_dir: Option<PathBuf>,

    /// Seconds an unclaimed streamer code stays valid.
    #[arg(long, env = "SV_RELAY_CLIENT_TIMEOUT")]
    client_timeout: Option<u64>,

    /// Seconds between sweeps for expired codes.
    #[arg(long, env = "SV_RELAY_CHECK_INTERVAL")]
    check_interval: Option<u64>,

    /// What logged-in sessions do.
    #[arg(long, value_enum, env = "SV_RELAY_MODE")]
    mode: Option<SessionMode>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Add a user to the config file, storing only a bcrypt hash of the password.
    AddUser {
        email: String,
        #[arg(long, env = "SV_RELAY_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

impl Cli {
    /// Loads the config file and applies the flags on top of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let config = load_config(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))?;
        Ok(self.apply_to(config))
    }

    fn apply_to(self, mut config: RelayConfig) -> RelayConfig {
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(certs_dir) = self.certs_dir {
            config.server.certs_dir = certs_dir;
        }
        if let Some(secs) = self.client_timeout {
            config.sessions.client_timeout_secs = secs;
        }
        if let Some(secs) = self.check_interval {
            config.sessions.check_interval_secs = secs;
        }
        if let Some(mode) = self.mode {
            config.server.mode = mode;
        }
        config
    }
}

/// Builds the credential store from the `[credentials]` section.
fn seed_credentials(section: &CredentialsConfig) -> anyhow::Result<Arc<dyn CredentialStore>> {
    let store = InMemoryCredentialStore::with_cost(section.bcrypt_cost);
    for user in &section.users {
        let added = match user.secret()? {
            UserSecret::Hashed(hash) => store.add_user_with_hash(&user.email, hash),
            UserSecret::Plain(password) => {
                warn!(
                    "user {} has a plain-text password in the config; replace it with `sv-relay add-user`",
                    user.email
                );
                store.add_user(&user.email, password)
            }
        };
        added.with_context(|| format!("failed to add user {}", user.email))?;
    }
    if store.is_empty() {
        warn!("no users configured; every LOGIN will be rejected");
    } else {
        info!("loaded {} user(s)", store.len());
    }
    Ok(Arc::new(store))
}

/// Hashes `password` and appends the user to the config at `path`, creating
/// the file if needed.
///
/// # Errors
///
/// Fails if the email is already configured, or the file cannot be read,
/// parsed or written.
fn add_user(path: &Path, email: &str, password: &str) -> anyhow::Result<()> {
    let mut config = load_config(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    if config.credentials.contains_user(email) {
        anyhow::bail!("user with '{email}' email already exists in {}", path.display());
    }

    let hash = bcrypt::hash(password, config.credentials.bcrypt_cost)
        .context("failed to hash password")?;
    config.credentials.add_hashed_user(email, hash)?;
    save_config(&config, path)
        .with_context(|| format!("failed to write config to {}", path.display()))?;

    info!("added {email} to {}", path.display());
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut cli = Cli::parse();
    if let Some(Command::AddUser { email, password }) = cli.command.take() {
        return add_user(&cli.config, &email, &password);
    }
    let config = cli.into_relay_config()?;
    let addr = config.bind_addr()?;

    let tls_config = tls::load_server_config(&config.server.certs_dir).with_context(|| {
        format!(
            "failed to load TLS material from {}",
            config.server.certs_dir.display()
        )
    })?;
    let credentials = seed_credentials(&config.credentials)?;

    let registry = Arc::new(SessionRegistry::new(config.registry_config()));
    registry.start_eviction();

    let services = RelayServices {
        registry,
        credentials,
        behavior: behavior_for(config.server.mode),
    };
    let settings = ListenerSettings {
        handshake_timeout: config.handshake_timeout(),
        buffer_size: config.server.buffer_size,
    };
    let server = RelayServer::bind(addr, tls_config, services, settings).await?;

    info!(
        "ScreenViewer relay starting: addr={addr}, mode={:?}",
        config.server.mode
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    server.run(running).await?;

    info!("ScreenViewer relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sv_relay::infrastructure::storage::config::UserEntry;

    #[test]
    fn test_cli_defaults_leave_config_untouched() {
        // Arrange: parse with no arguments
        let cli = Cli::parse_from(["sv-relay"]);

        // Act
        let config = cli.apply_to(RelayConfig::default());

        // Assert
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_cli_default_config_path() {
        let cli = Cli::parse_from(["sv-relay"]);
        assert_eq!(cli.config, PathBuf::from("sv-relay.toml"));
    }

    #[test]
    fn test_cli_port_and_bind_override_file() {
        let cli = Cli::parse_from(["sv-relay", "--port", "9999", "--bind", "127.0.0.1"]);
        let config = cli.apply_to(RelayConfig::default());
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:9999");
    }

    #[test]
    fn test_cli_timing_overrides() {
        let cli = Cli::parse_from(["sv-relay", "--client-timeout", "30", "--check-interval", "0"]);
        let config = cli.apply_to(RelayConfig::default());
        assert_eq!(config.sessions.client_timeout_secs, 30);
        assert_eq!(config.sessions.check_interval_secs, 0);
    }

    #[test]
    fn test_cli_mode_override() {
        let cli = Cli::parse_from(["sv-relay", "--mode", "echo"]);
        let config = cli.apply_to(RelayConfig::default());
        assert_eq!(config.server.mode, SessionMode::Echo);
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["sv-relay", "--mode", "mirror"]).is_err());
    }

    #[test]
    fn test_cli_certs_dir_override() {
        let cli = Cli::parse_from(["sv-relay", "--certs-dir", "/etc/sv"]);
        let config = cli.apply_to(RelayConfig::default());
        assert_eq!(config.server.certs_dir, PathBuf::from("/etc/sv"));
    }

    #[test]
    fn test_seed_credentials_rejects_duplicate_users() {
        // Arrange
        let section = CredentialsConfig {
            bcrypt_cost: 4,
            users: vec![
                UserEntry::with_password("a@example.com", "1"),
                UserEntry::with_password("a@example.com", "2"),
            ],
        };

        // Act
        let result = seed_credentials(&section);

        // Assert
        assert!(result.is_err());
    }

    #[test]
    fn test_seed_credentials_accepts_configured_user() {
        let section = CredentialsConfig {
            bcrypt_cost: 4,
            users: vec![UserEntry::with_password("a@example.com", "pw")],
        };

        let store = seed_credentials(&section).unwrap();

        assert!(store.authenticate("a@example.com", "pw"));
    }

    #[test]
    fn test_seed_credentials_uses_hashed_entries_as_is() {
        // Arrange
        let section = CredentialsConfig {
            bcrypt_cost: 4,
            users: vec![UserEntry::with_hash(
                "a@example.com",
                bcrypt::hash("pw", 4).unwrap(),
            )],
        };

        // Act
        let store = seed_credentials(&section).unwrap();

        // Assert
        assert!(store.authenticate("a@example.com", "pw"));
    }

    #[test]
    fn test_seed_credentials_rejects_entry_without_secret() {
        let section = CredentialsConfig {
            bcrypt_cost: 4,
            users: vec![UserEntry {
                email: "a@example.com".into(),
                password: None,
                password_hash: None,
            }],
        };

        assert!(seed_credentials(&section).is_err());
    }

    fn temp_config(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("sv-relay-{name}-{}.toml", std::process::id()));
        std::fs::remove_file(&path).ok();
        path
    }

    #[test]
    fn test_cli_parses_add_user() {
        let cli = Cli::parse_from(["sv-relay", "add-user", "a@example.com", "--password", "pw"]);
        assert!(matches!(
            cli.command,
            Some(Command::AddUser { ref email, ref password })
                if email == "a@example.com" && password == "pw"
        ));
    }

    #[test]
    fn test_add_user_writes_only_a_hash() {
        // Arrange: a config that keeps hashing cheap
        let path = temp_config("add-user");
        std::fs::write(&path, "[credentials]\nbcrypt_cost = 4\n").unwrap();

        // Act
        add_user(&path, "new@example.com", "s3cret").unwrap();

        // Assert: the file holds a hash that the relay accepts at startup
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("s3cret"));
        let config = load_config(&path).unwrap();
        let store = seed_credentials(&config.credentials).unwrap();
        assert!(store.authenticate("new@example.com", "s3cret"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_add_user_rejects_duplicate_email() {
        // Arrange
        let path = temp_config("add-user-dup");
        std::fs::write(&path, "[credentials]\nbcrypt_cost = 4\n").unwrap();
        add_user(&path, "dup@example.com", "first").unwrap();

        // Act
        let err = add_user(&path, "dup@example.com", "second").unwrap_err();

        // Assert: the original entry is untouched
        assert!(err.to_string().contains("already exists"));
        let config = load_config(&path).unwrap();
        assert_eq!(config.credentials.users.len(), 1);
        let store = seed_credentials(&config.credentials).unwrap();
        assert!(store.authenticate("dup@example.com", "first"));
        std::fs::remove_file(&path).ok();
    }
}
