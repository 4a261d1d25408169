use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub gateway_host: String,
    pub gateway_port: u16,
    pub max_connections_per_schema: u32,
    pub max_admin_connections: u32,
    pub max_total_connections: u32,
    pub pool_idle_timeout: Duration,
    pub pool_wait_timeout: Duration,
    pub cleanup_interval: Duration,
    pub export_page_size: i64,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => database_url_from_parts(),
        };

        let max_connections_per_schema = env_or("MAX_CONNECTIONS_PER_SCHEMA", 5u32);
        if max_connections_per_schema == 0 {
            anyhow::bail!("MAX_CONNECTIONS_PER_SCHEMA must be at least 1");
        }

        let export_page_size = env_or("EXPORT_PAGE_SIZE", 500i64);
        if export_page_size <= 0 {
            anyhow::bail!("EXPORT_PAGE_SIZE must be positive");
        }

        Ok(Config {
            database_url,
            gateway_host: env::var("GATEWAY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            gateway_port: env_or("GATEWAY_PORT", 9000u16),
            max_connections_per_schema,
            max_admin_connections: env_or("MAX_ADMIN_CONNECTIONS", 10u32),
            max_total_connections: env_or("MAX_TOTAL_CONNECTIONS", 200u32),
            pool_idle_timeout: Duration::from_secs(env_or("POOL_IDLE_TIMEOUT_SECS", 1800u64)),
            pool_wait_timeout: Duration::from_secs(env_or("POOL_WAIT_TIMEOUT_SECS", 5u64)),
            cleanup_interval: Duration::from_secs(env_or("CLEANUP_INTERVAL_SECS", 300u64).max(1)),
            export_page_size,
            log_dir: env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/log/tenant-schema-gateway")),
        })
    }

    /// Config pointing at `database_url` with every other knob at its default.
    pub fn with_database_url(database_url: impl Into<String>) -> Self {
        Config {
            database_url: database_url.into(),
            gateway_host: "127.0.0.1".to_string(),
            gateway_port: 9000,
            max_connections_per_schema: 5,
            max_admin_connections: 10,
            max_total_connections: 200,
            pool_idle_timeout: Duration::from_secs(1800),
            pool_wait_timeout: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(300),
            export_page_size: 500,
            log_dir: PathBuf::from("/var/log/tenant-schema-gateway"),
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.gateway_host, self.gateway_port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address: {}", e))
    }
}

/// Assemble a connection URL from `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER`
/// and `DB_PASSWORD`. The password is percent-encoded.
fn database_url_from_parts() -> String {
    let part = |key: &str, default: &str| env::var(key).unwrap_or_else(|_| default.to_string());

    format!(
        "postgres://{}:{}@{}:{}/{}",
        part("DB_USER", "tenant_gateway"),
        urlencoding::encode(&part("DB_PASSWORD", "password")),
        part("DB_HOST", "localhost"),
        part("DB_PORT", "5432"),
        part("DB_NAME", "postgres"),
    )
}

/// Read and parse an environment variable, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::with_database_url("postgres://u:p@localhost:5432/app");
        assert_eq!(config.max_connections_per_schema, 5);
        assert_eq!(config.pool_wait_timeout, Duration::from_secs(5));
        assert_eq!(config.export_page_size, 500);
        assert_eq!(
            config.socket_addr().unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        env::set_var("TENANT_GATEWAY_TEST_KNOB", "not-a-number");
        assert_eq!(env_or("TENANT_GATEWAY_TEST_KNOB", 7u32), 7);
        env::set_var("TENANT_GATEWAY_TEST_KNOB", " 12 ");
        assert_eq!(env_or("TENANT_GATEWAY_TEST_KNOB", 7u32), 12);
        env::remove_var("TENANT_GATEWAY_TEST_KNOB");
        assert_eq!(env_or("TENANT_GATEWAY_TEST_KNOB", 7u32), 7);
    }
}
