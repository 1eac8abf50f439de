use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Platform fee in basis points of the payout gross.
    pub platform_fee_bps: i64,
    /// Floor the platform fee never goes below, in cents.
    pub min_platform_fee_cents: i64,
    /// How long a service request stays open for offers.
    pub request_ttl_hours: i64,
    /// Default negotiation window for a new booking thread.
    pub negotiation_window_hours: i64,
    /// Interval between background sweep passes.
    #[serde(default = "default_sweep_seconds")]
    pub sweep_interval_seconds: u64,
    /// Contract version vendors must have accepted to publish.
    pub current_contract_version: u32,
}

fn default_sweep_seconds() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in.
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `VENUO_SERVER__PORT=8080` sets `server.port`.
            .add_source(config::Environment::with_prefix("VENUO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
