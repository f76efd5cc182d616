//! Configuration Module
//!
//! Handles loading server and client configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Reads an environment variable and parses it, falling back to `default`.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// == Server Config ==
/// Cache server configuration parameters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Namespace every client must present during the handshake
    pub cache_name: String,
    /// Address the TCP acceptor binds to
    pub host: String,
    /// Port of the cache protocol listener
    pub port: u16,
    /// Port of the admin HTTP surface
    pub admin_port: u16,
    /// How often the server looks for keys whose expiry deadline has passed
    pub expiry_check_interval_ms: u64,
    /// How long a fresh connection may take to send its handshake
    pub handshake_timeout_ms: u64,
}

impl ServerConfig {
    /// Creates a config for the given namespace with all other values defaulted.
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            ..Self::default()
        }
    }

    /// Creates a new ServerConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_NAME` - Namespace (default: "default")
    /// - `SERVER_HOST` - Bind address (default: 0.0.0.0)
    /// - `SERVER_PORT` - Cache protocol port (default: 1234)
    /// - `ADMIN_PORT` - Admin HTTP port (default: 3000)
    /// - `EXPIRY_CHECK_INTERVAL_MS` - Expiry scan frequency (default: 1000)
    /// - `HANDSHAKE_TIMEOUT_MS` - Handshake deadline (default: 5000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_name: env_or("CACHE_NAME", defaults.cache_name),
            host: env_or("SERVER_HOST", defaults.host),
            port: env_or("SERVER_PORT", defaults.port),
            admin_port: env_or("ADMIN_PORT", defaults.admin_port),
            expiry_check_interval_ms: env_or(
                "EXPIRY_CHECK_INTERVAL_MS",
                defaults.expiry_check_interval_ms,
            ),
            handshake_timeout_ms: env_or("HANDSHAKE_TIMEOUT_MS", defaults.handshake_timeout_ms),
        }
    }

    pub fn expiry_check_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_check_interval_ms.max(1))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cache_name: "default".to_string(),
            host: "0.0.0.0".to_string(),
            port: 1234,
            admin_port: 3000,
            expiry_check_interval_ms: 1000,
            handshake_timeout_ms: 5000,
        }
    }
}

// == Client Config ==
/// Cache client configuration parameters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identity of this client, unique among connected clients
    pub client_id: String,
    /// Namespace presented to the server
    pub cache_name: String,
    /// Maximum local age of an entry in milliseconds, 0 = unbounded
    pub max_local_entry_age_ms: u64,
    /// Base interval of the local expiry sweep
    pub sweep_interval_ms: u64,
    /// Maximum number of local entries, 0 = unbounded
    pub max_local_entries: usize,
    /// First reconnect delay
    pub reconnect_initial_ms: u64,
    /// Reconnect delay cap
    pub reconnect_max_ms: u64,
    /// How long to wait for the server's handshake answer
    pub handshake_timeout_ms: u64,
}

impl ClientConfig {
    /// Creates a config for the given identity and namespace with all other values defaulted.
    pub fn new(client_id: impl Into<String>, cache_name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            cache_name: cache_name.into(),
            ..Self::default()
        }
    }

    /// Creates a new ClientConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CLIENT_ID` - Client identity (default: generated)
    /// - `CACHE_NAME` - Namespace (default: "default")
    /// - `MAX_LOCAL_ENTRY_AGE_MS` - Local TTL, 0 = unbounded (default: 0)
    /// - `SWEEP_INTERVAL_MS` - Expiry sweep frequency (default: 1000)
    /// - `MAX_LOCAL_ENTRIES` - Local capacity, 0 = unbounded (default: 0)
    /// - `RECONNECT_INITIAL_MS` / `RECONNECT_MAX_MS` - Backoff bounds (default: 100 / 5000)
    /// - `HANDSHAKE_TIMEOUT_MS` - Handshake deadline (default: 5000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            client_id: env_or("CLIENT_ID", defaults.client_id),
            cache_name: env_or("CACHE_NAME", defaults.cache_name),
            max_local_entry_age_ms: env_or("MAX_LOCAL_ENTRY_AGE_MS", defaults.max_local_entry_age_ms),
            sweep_interval_ms: env_or("SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            max_local_entries: env_or("MAX_LOCAL_ENTRIES", defaults.max_local_entries),
            reconnect_initial_ms: env_or("RECONNECT_INITIAL_MS", defaults.reconnect_initial_ms),
            reconnect_max_ms: env_or("RECONNECT_MAX_MS", defaults.reconnect_max_ms),
            handshake_timeout_ms: env_or("HANDSHAKE_TIMEOUT_MS", defaults.handshake_timeout_ms),
        }
    }

    /// Sets the local TTL.
    pub fn with_max_local_entry_age(mut self, millis: u64) -> Self {
        self.max_local_entry_age_ms = millis;
        self
    }

    /// Sets the local capacity.
    pub fn with_max_local_entries(mut self, entries: usize) -> Self {
        self.max_local_entries = entries;
        self
    }

    /// Sets the reconnect backoff bounds.
    pub fn with_reconnect_backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.reconnect_initial_ms = initial_ms;
        self.reconnect_max_ms = max_ms;
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self {
            client_id: format!("client-{}-{}", std::process::id(), stamp),
            cache_name: "default".to_string(),
            max_local_entry_age_ms: 0,
            sweep_interval_ms: 1000,
            max_local_entries: 0,
            reconnect_initial_ms: 100,
            reconnect_max_ms: 5000,
            handshake_timeout_ms: 5000,
        }
    }
}
