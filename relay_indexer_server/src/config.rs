use std::{env, fmt::Display, str::FromStr};

use log::*;
use relay_common::helpers::parse_boolean_flag;
use relay_indexer::{
    channels::ChannelConfig,
    db::sqlite::{db_url, DEFAULT_DATABASE_URL},
    db_types::OrderStatus,
};

const DEFAULT_RELAY_HOST: &str = "127.0.0.1";
const DEFAULT_RELAY_PORT: u16 = 8370;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CONCURRENCY: usize = 1;
const DEFAULT_MAX_REDELIVERIES: u32 = 5;
const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 1024;

#[derive(Clone, Debug)]
pub struct IndexerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    /// If true, pending database migrations are applied at startup.
    pub run_migrations: bool,
    /// The number of fill messages that may be applied at the same time
    pub fill_concurrency: usize,
    /// The number of spend messages that may be applied at the same time
    pub spend_concurrency: usize,
    /// The number of order messages that may be indexed at the same time
    pub index_concurrency: usize,
    /// The status given to newly indexed orders
    pub initial_status: OrderStatus,
    /// The status given to orders whose maker can no longer cover them
    pub unfunded_status: OrderStatus,
    /// How many times a failed message is redelivered before it is dropped
    pub max_redeliveries: u32,
    pub channel_buffer_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RELAY_HOST.to_string(),
            port: DEFAULT_RELAY_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            run_migrations: true,
            fill_concurrency: DEFAULT_CONCURRENCY,
            spend_concurrency: DEFAULT_CONCURRENCY,
            index_concurrency: DEFAULT_CONCURRENCY,
            initial_status: OrderStatus::Open,
            unfunded_status: OrderStatus::Unfunded,
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
            channel_buffer_size: DEFAULT_CHANNEL_BUFFER_SIZE,
        }
    }
}

impl IndexerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("RELAY_HOST").ok().unwrap_or_else(|| DEFAULT_RELAY_HOST.into());
        let port = parse_or_default("RELAY_PORT", env::var("RELAY_PORT").ok(), DEFAULT_RELAY_PORT);
        let database_url = db_url();
        let db_max_connections = parse_or_default(
            "RELAY_DB_MAX_CONNECTIONS",
            env::var("RELAY_DB_MAX_CONNECTIONS").ok(),
            DEFAULT_DB_MAX_CONNECTIONS,
        );
        let run_migrations = parse_boolean_flag(env::var("RELAY_RUN_MIGRATIONS").ok(), true);
        let fill_concurrency = concurrency_from_env("RELAY_FILL_CONCURRENCY");
        let spend_concurrency = concurrency_from_env("RELAY_SPEND_CONCURRENCY");
        let index_concurrency = concurrency_from_env("RELAY_INDEX_CONCURRENCY");
        let initial_status =
            target_status_or_default("RELAY_INITIAL_STATUS", env::var("RELAY_INITIAL_STATUS").ok(), OrderStatus::Open);
        if initial_status != OrderStatus::Open {
            warn!("🪛️ New orders will be indexed as {initial_status} rather than Open.");
        }
        let unfunded_status = target_status_or_default(
            "RELAY_UNFUNDED_STATUS",
            env::var("RELAY_UNFUNDED_STATUS").ok(),
            OrderStatus::Unfunded,
        );
        if unfunded_status == OrderStatus::Open {
            warn!("🪛️ RELAY_UNFUNDED_STATUS is Open. Funding checks will never take an order off the book.");
        }
        let max_redeliveries = parse_or_default(
            "RELAY_MAX_REDELIVERIES",
            env::var("RELAY_MAX_REDELIVERIES").ok(),
            DEFAULT_MAX_REDELIVERIES,
        );
        let channel_buffer_size = parse_or_default(
            "RELAY_CHANNEL_BUFFER_SIZE",
            env::var("RELAY_CHANNEL_BUFFER_SIZE").ok(),
            DEFAULT_CHANNEL_BUFFER_SIZE,
        );
        Self {
            host,
            port,
            database_url,
            db_max_connections,
            run_migrations,
            fill_concurrency,
            spend_concurrency,
            index_concurrency,
            initial_status,
            unfunded_status,
            max_redeliveries,
            channel_buffer_size,
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig { buffer_size: self.channel_buffer_size, max_redeliveries: self.max_redeliveries }
    }
}

fn concurrency_from_env(name: &str) -> usize {
    let value = parse_or_default(name, env::var(name).ok(), DEFAULT_CONCURRENCY);
    if value == 0 {
        warn!("🪛️ {name} must be at least 1. Using {DEFAULT_CONCURRENCY} instead.");
        return DEFAULT_CONCURRENCY;
    }
    value
}

/// Parses a status the indexer may assign on its own. Only `Open` and `Unfunded` qualify.
pub fn target_status_or_default(name: &str, value: Option<String>, default: OrderStatus) -> OrderStatus {
    let status = parse_or_default(name, value, default);
    if status.is_fundable() {
        return status;
    }
    error!("🪛️ {name} cannot be {status}. The indexer only assigns Open or Unfunded. Using the default, {default}.");
    default
}

/// Parses `value`, falling back to `default` (with a log message) when it is missing or invalid.
pub fn parse_or_default<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        None => {
            debug!("🪛️ {name} is not set. Using the default, {default}.");
            default
        },
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_values_or_fall_back() {
        assert_eq!(parse_or_default("PORT", Some("9000".into()), 8370u16), 9000);
        assert_eq!(parse_or_default("PORT", Some("99999".into()), 8370u16), 8370);
        assert_eq!(parse_or_default("PORT", None, 8370u16), 8370);
        assert_eq!(parse_or_default("CONCURRENCY", Some(" 4 ".into()), 1usize), 4);
    }

    #[test]
    fn parse_statuses() {
        assert_eq!(parse_or_default("STATUS", Some("Unfunded".into()), OrderStatus::Open), OrderStatus::Unfunded);
        assert_eq!(parse_or_default("STATUS", Some("unfunded".into()), OrderStatus::Open), OrderStatus::Open);
    }

    #[test]
    fn target_statuses_must_be_fundable() {
        use OrderStatus::*;
        assert_eq!(target_status_or_default("RELAY_UNFUNDED_STATUS", Some("Filled".into()), Unfunded), Unfunded);
        assert_eq!(target_status_or_default("RELAY_UNFUNDED_STATUS", Some("Cancelled".into()), Unfunded), Unfunded);
        assert_eq!(target_status_or_default("RELAY_UNFUNDED_STATUS", Some("Open".into()), Unfunded), Open);
        assert_eq!(target_status_or_default("RELAY_INITIAL_STATUS", Some("Filled".into()), Open), Open);
        assert_eq!(target_status_or_default("RELAY_INITIAL_STATUS", Some("Unfunded".into()), Open), Unfunded);
        assert_eq!(target_status_or_default("RELAY_INITIAL_STATUS", None, Open), Open);
    }

    #[test]
    fn defaults() {
        let config = IndexerConfig::new("0.0.0.0", 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.initial_status, OrderStatus::Open);
        assert_eq!(config.unfunded_status, OrderStatus::Unfunded);
        let channel = config.channel_config();
        assert_eq!(channel.max_redeliveries, 5);
        assert_eq!(channel.buffer_size, 1024);
    }
}
