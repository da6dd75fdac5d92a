use anyhow::Context;
use sqlx::{MySqlPool, mysql::MySqlPoolOptions};
use tracing::{info, warn};

use crate::config::LeavePolicy;

pub async fn init_db(database_url: &str) -> anyhow::Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(pool)
}

/// Applies rows of the `settings` table on top of `policy`.
///
/// Unknown keys and unparsable values are logged and ignored, so a bad row never keeps
/// the service from starting.
pub async fn load_policy_overrides(pool: &MySqlPool, policy: &mut LeavePolicy) -> anyhow::Result<()> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT setting_key, setting_value FROM settings",
    )
    .fetch_all(pool)
    .await
    .context("Failed to load settings")?;

    for (key, value) in rows {
        match policy.apply_setting(&key, &value) {
            Ok(true) => info!(key = %key, value = %value, "Policy setting applied"),
            Ok(false) => {}
            Err(e) => warn!(key = %key, value = %value, error = %e, "Ignoring invalid setting"),
        }
    }

    Ok(())
}
