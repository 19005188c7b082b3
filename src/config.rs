//! Configuration manager for HireWise.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");
/// 5 MiB, shared by every upload category.
pub const DEFAULT_MAX_FILE_SIZE: usize = 5 * 1024 * 1024;
const DEFAULT_UPLOADS_DIR: &str = "uploads";
const DEFAULT_TOKEN_LIFETIME: u64 = 60 * 60 * 24; // 24 hours.

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Public URL of the API, used to build file URLs.
    pub url: String,
    /// Deployment environment. Controls error verbosity.
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to automatic mail sending.
    #[serde(skip_serializing)]
    pub mail: Option<Mail>,
    /// Related to file uploads.
    #[serde(default, skip_serializing)]
    pub uploads: Uploads,
    /// Related to JsonWebToken configuration.
    #[serde(default, skip_serializing)]
    pub token: Token,
}

/// Deployment environment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    /// Whether internal error details may be sent to clients.
    pub fn exposes_details(&self) -> bool {
        *self != Environment::Production
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "test" => Ok(Environment::Development),
            other => Err(format!("unknown environment `{other}`")),
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
    /// Full connection URL. Takes precedence over other fields.
    #[serde(default)]
    pub url: Option<String>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// RabbitMQ mail queue configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    /// Hostname:(?port) for RabbitMQ instance.
    pub address: String,
    /// RabbitMQ default vhost.
    pub vhost: Option<String>,
    /// RabbitMQ username to access queue.
    pub username: String,
    /// RabbitMQ password to access queue.
    pub password: String,
    /// Max channel connections.
    pub pool: Option<u16>,
    /// Queue name to send mailing events.
    pub queue: String,
}

/// Uploads configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Uploads {
    /// Root directory. Category folders are created below it.
    pub directory: PathBuf,
    /// Maximum accepted file size in bytes.
    pub max_file_size: usize,
}

impl Default for Uploads {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_UPLOADS_DIR),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Json Web Token configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Token {
    /// HMAC secret. Usually provided with `JWT_SECRET`.
    #[serde(default)]
    pub secret: String,
    /// Token lifetime, in seconds.
    pub lifetime: u64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            secret: String::default(),
            lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location, then applies environment overrides.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let mut config = match File::open(file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file) {
                Ok(config) => config,
                Err(err) => self.error(err),
            },
            Err(err) => self.error(err),
        };

        config.version = VERSION.to_owned();
        config.apply_env(|key| std::env::var(key).ok());

        if !config.url.is_empty() {
            config.url = self.normalize_url(&config.url)?;
        }

        Ok(Arc::new(config))
    }

    /// Override values with environment variables.
    ///
    /// `lookup` is injected so tests do not have to touch the process
    /// environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            self.token.secret = secret;
        }

        if let Some(size) = lookup("MAX_FILE_SIZE") {
            match size.parse::<usize>() {
                Ok(size) if size > 0 => self.uploads.max_file_size = size,
                _ => tracing::warn!(%size, "ignoring invalid `MAX_FILE_SIZE`"),
            }
        }

        if let Some(dir) = lookup("UPLOADS_DIR").filter(|s| !s.is_empty()) {
            self.uploads.directory = PathBuf::from(dir);
        }

        if let Some(env) = lookup("ENVIRONMENT") {
            match env.parse() {
                Ok(env) => self.environment = env,
                Err(err) => tracing::warn!(%err, "ignoring `ENVIRONMENT`"),
            }
        }

        if let Some(url) = lookup("DATABASE_URL").filter(|s| !s.is_empty()) {
            let mut postgres = self.postgres.take().unwrap_or_default();
            postgres.url = Some(url);
            self.postgres = Some(postgres);
        }
    }

    /// Current application version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}
