use std::{env, fmt::Display, str::FromStr};

use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;

/// Allocation defaults and request limits the ledger is built with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeavePolicy {
    pub default_vacation_days: i32,
    pub default_permission_hours: i32,
    /// Upper bound for a single special-permission request.
    pub max_hours_per_request: i32,
}

impl Default for LeavePolicy {
    fn default() -> Self {
        Self {
            default_vacation_days: 22,
            default_permission_hours: 24,
            max_hours_per_request: 8,
        }
    }
}

impl LeavePolicy {
    /// Applies a single `settings` row. Unknown keys are ignored and reported as `false`.
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Result<bool> {
        let slot = match key {
            "default_vacation_days" => &mut self.default_vacation_days,
            "default_permission_hours" => &mut self.default_permission_hours,
            "max_hours_per_request" => &mut self.max_hours_per_request,
            _ => return Ok(false),
        };
        let parsed: i32 = value
            .trim()
            .parse()
            .with_context(|| format!("setting {key} has non-numeric value {value:?}"))?;
        if parsed < 0 {
            return Err(anyhow!("setting {key} must not be negative"));
        }
        *slot = parsed;
        Ok(true)
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,

    // Rate limiting
    pub rate_protected_per_min: u32,
    pub rate_decision_per_min: u32,

    pub api_prefix: String,
    pub log_dir: String,

    pub policy: LeavePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let defaults = LeavePolicy::default();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,

            rate_protected_per_min: parse_var(
                "RATE_PROTECTED_PER_MIN",
                env::var("RATE_PROTECTED_PER_MIN").ok(),
                1000,
            )?,
            rate_decision_per_min: parse_var(
                "RATE_DECISION_PER_MIN",
                env::var("RATE_DECISION_PER_MIN").ok(),
                120,
            )?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),

            policy: LeavePolicy {
                default_vacation_days: parse_var(
                    "DEFAULT_VACATION_DAYS",
                    env::var("DEFAULT_VACATION_DAYS").ok(),
                    defaults.default_vacation_days,
                )?,
                default_permission_hours: parse_var(
                    "DEFAULT_PERMISSION_HOURS",
                    env::var("DEFAULT_PERMISSION_HOURS").ok(),
                    defaults.default_permission_hours,
                )?,
                max_hours_per_request: parse_var(
                    "MAX_HOURS_PER_REQUEST",
                    env::var("MAX_HOURS_PER_REQUEST").ok(),
                    defaults.max_hours_per_request,
                )?,
            },
        })
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{name} must be set"))
}

fn parse_var<T>(name: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow!("{name} has invalid value {value:?}: {e}")),
    }
}
