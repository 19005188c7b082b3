//! database (db) union structure.
use axum::extract::FromRef;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::AppState;
use crate::config::Postgres;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "hirewise";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub postgres: PgPool,
}

impl Database {
    /// Init database connections.
    pub async fn new(config: &Postgres) -> Result<Self, sqlx::Error> {
        let addr = match &config.url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}/{}",
                config.username.as_deref().unwrap_or(DEFAULT_CREDENTIALS),
                config.password.as_deref().unwrap_or(DEFAULT_CREDENTIALS),
                config.address,
                config.database.as_deref().unwrap_or(DEFAULT_DATABASE_NAME),
            ),
        };
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size.unwrap_or(DEFAULT_POOL_SIZE));
        let postgres = pool.connect(&addr).await?;

        tracing::info!(hostname = %config.address, "postgres connected");

        Ok(Self { postgres })
    }

    /// Wrap an existing pool.
    pub fn from_pool(postgres: PgPool) -> Self {
        Self { postgres }
    }

    /// Whether the pool can still hand out connections.
    pub async fn is_available(&self) -> bool {
        if self.postgres.is_closed() {
            return false;
        }

        match self.postgres.acquire().await {
            Ok(_) => true,
            Err(err) => {
                tracing::error!(error = %err, "postgres connection unavailable");
                false
            },
        }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(app_state: &AppState) -> Database {
        app_state.db.clone()
    }
}
