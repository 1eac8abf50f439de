use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Row};
use std::time::Duration;
use tracing::info;

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlays operator-set rules from the database onto the file
    /// defaults. Rows are `{"value": <number>}` keyed by rule name.
    pub async fn fetch_business_rules(
        &self,
        defaults: BusinessRules,
    ) -> Result<BusinessRules, sqlx::Error> {
        let rows = sqlx::query("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for row in rows {
            let key: String = row.try_get("rule_key")?;
            let val: serde_json::Value = row.try_get("rule_value")?;
            let Some(v) = val.get("value") else { continue };
            match key.as_str() {
                "platform_fee_bps" => {
                    if let Some(n) = v.as_i64() {
                        rules.platform_fee_bps = n;
                    }
                }
                "min_platform_fee_cents" => {
                    if let Some(n) = v.as_i64() {
                        rules.min_platform_fee_cents = n;
                    }
                }
                "request_ttl_hours" => {
                    if let Some(n) = v.as_i64() {
                        rules.request_ttl_hours = n;
                    }
                }
                "negotiation_window_hours" => {
                    if let Some(n) = v.as_i64() {
                        rules.negotiation_window_hours = n;
                    }
                }
                "sweep_interval_seconds" => {
                    if let Some(n) = v.as_u64() {
                        rules.sweep_interval_seconds = n;
                    }
                }
                "current_contract_version" => {
                    if let Some(n) = v.as_u64() {
                        rules.current_contract_version = n as u32;
                    }
                }
                _ => {}
            }
        }

        Ok(rules)
    }
}
