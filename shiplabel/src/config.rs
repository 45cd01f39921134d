//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `SHIPLABEL_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `SHIPLABEL_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `SHIPLABEL_LABELS__SCRATCH_DIR=/var/tmp/barcodes` sets the `labels.scratch_dir` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! SHIPLABEL_PORT=8080
//! SHIPLABEL_SECRET_KEY="change-me"
//! SHIPLABEL_ADMIN_PASSWORD="hunter2"
//! SHIPLABEL_LABELS__GENERATION_TIMEOUT=10s
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::PathBuf, time::Duration};

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SHIPLABEL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Secret key for signing session tokens (required)
    pub secret_key: Option<String>,
    /// Username of the account seeded from `admin_password`
    pub admin_username: String,
    /// Password for the seeded account. No account is seeded when unset.
    pub admin_password: Option<String>,
    /// Additional accounts with pre-hashed (Argon2 PHC) passwords
    pub users: Vec<UserAccount>,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Label generation settings
    pub labels: LabelsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// An account loaded from configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UserAccount {
    pub username: String,
    /// Argon2 hash in PHC string format
    pub password_hash: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Session cookie configuration
    pub session: SessionConfig,
    /// Password hashing parameters
    pub password: PasswordConfig,
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Session lifetime, also used as the token expiry
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Cookie name for session token
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    /// SameSite cookie attribute ("strict", "lax", or "none")
    pub cookie_same_site: String,
}

/// Argon2 parameters used when hashing passwords at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Argon2 memory cost in KiB (default: 19456 KiB = 19 MB)
    pub argon2_memory_kib: u32,
    /// Argon2 iterations (default: 2)
    pub argon2_iterations: u32,
    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

/// Label generation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelsConfig {
    /// Scratch directory for barcode images. Cleared at startup.
    pub scratch_dir: PathBuf,
    /// Upper bound on the time from accepting a request to finishing its document
    #[serde(with = "humantime_serde")]
    pub generation_timeout: Duration,
    /// Heading printed at the top of every label
    pub title: String,
    /// Number of document chunks buffered ahead of a slow client
    pub stream_buffer: usize,
    pub barcode: BarcodeConfig,
}

/// Barcode raster geometry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BarcodeConfig {
    /// Bar height in pixels
    pub bar_height: u32,
    /// Width of a single module in pixels
    pub module_width: u32,
    /// Blank modules on each side of the symbol
    pub quiet_zone: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            secret_key: None,
            admin_username: "admin".to_string(),
            admin_password: None,
            users: vec![],
            auth: AuthConfig::default(),
            labels: LabelsConfig::default(),
            enable_otel_export: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(24 * 60 * 60), // 24 hours
            cookie_name: "shiplabel_session".to_string(),
            cookie_secure: true,
            cookie_same_site: "strict".to_string(),
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            // Argon2id RFC recommendations
            argon2_memory_kib: 19456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("./tmp/barcodes"),
            generation_timeout: Duration::from_secs(30),
            title: "Delivery Label".to_string(),
            stream_buffer: 8,
            barcode: BarcodeConfig::default(),
        }
    }
}

impl Default for BarcodeConfig {
    fn default() -> Self {
        Self {
            bar_height: 80,
            module_width: 2,
            quiet_zone: 10,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Internal {
                operation: "Config validation: secret_key is not configured. \
                     Please set SHIPLABEL_SECRET_KEY environment variable or add secret_key to config file."
                    .to_string(),
            });
        }

        let timeout = self.auth.session.timeout.as_secs();
        if timeout < 300 {
            return Err(Error::Internal {
                operation: "Config validation: session timeout is too short (minimum 5 minutes)".to_string(),
            });
        }
        if timeout > 86400 * 30 {
            return Err(Error::Internal {
                operation: "Config validation: session timeout is too long (maximum 30 days)".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if user.username.trim().is_empty() {
                return Err(Error::Internal {
                    operation: "Config validation: users entries must have a non-empty username".to_string(),
                });
            }
            if !seen.insert(user.username.as_str()) {
                return Err(Error::Internal {
                    operation: format!("Config validation: duplicate username '{}' in users", user.username),
                });
            }
        }

        if self.labels.generation_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: labels.generation_timeout must be greater than zero".to_string(),
            });
        }
        if self.labels.stream_buffer == 0 {
            return Err(Error::Internal {
                operation: "Config validation: labels.stream_buffer cannot be 0".to_string(),
            });
        }
        if self.labels.barcode.bar_height == 0 || self.labels.barcode.module_width == 0 {
            return Err(Error::Internal {
                operation: "Config validation: labels.barcode.bar_height and module_width must be positive".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("SHIPLABEL_").split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
