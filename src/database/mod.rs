pub mod error;
pub mod memory;
pub mod models;
#[cfg(feature = "database")]
pub mod postgres;
pub mod store;

pub use memory::InMemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgStore;
pub use store::{ScheduleStore, TransactionLedger, WalletStore};

#[cfg(feature = "database")]
mod pool {
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use std::time::Duration;
    use tracing::{error as log_error, info};

    use super::error::StoreError;
    use crate::config::DatabaseConfig;

    /// Database pool configuration
    #[derive(Debug, Clone)]
    pub struct PoolConfig {
        pub max_connections: u32,
        pub min_connections: u32,
        pub connection_timeout: Duration,
        pub idle_timeout: Duration,
        pub max_lifetime: Duration,
    }

    impl Default for PoolConfig {
        fn default() -> Self {
            Self {
                max_connections: 20,
                min_connections: 5,
                connection_timeout: Duration::from_secs(30),
                idle_timeout: Duration::from_secs(600),
                max_lifetime: Duration::from_secs(1800),
            }
        }
    }

    impl From<&DatabaseConfig> for PoolConfig {
        fn from(config: &DatabaseConfig) -> Self {
            Self {
                max_connections: config.max_connections,
                min_connections: config.min_connections,
                connection_timeout: Duration::from_secs(config.connection_timeout),
                ..Self::default()
            }
        }
    }

    pub async fn init_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, StoreError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connection_timeout_secs = config.connection_timeout.as_secs(),
            "initializing database pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connection_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| {
                log_error!(error = %e, "failed to initialize database pool");
                StoreError::from_sqlx(e)
            })?;

        info!("database pool initialized");
        Ok(pool)
    }

    pub async fn init_pool_from_config(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
        init_pool(&config.url, PoolConfig::from(config)).await
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn pool_config_takes_sizes_from_app_config() {
            let config = PoolConfig::from(&DatabaseConfig {
                url: "postgres://localhost/vendora".to_string(),
                max_connections: 8,
                min_connections: 2,
                connection_timeout: 10,
            });
            assert_eq!(config.max_connections, 8);
            assert_eq!(config.min_connections, 2);
            assert_eq!(config.connection_timeout, Duration::from_secs(10));
            assert_eq!(config.max_lifetime, Duration::from_secs(1800));
        }
    }
}

#[cfg(feature = "database")]
pub use pool::{init_pool, init_pool_from_config, PoolConfig};
