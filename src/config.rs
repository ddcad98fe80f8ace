use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use chrono::FixedOffset;
use strum_macros::{Display, EnumString};

use crate::service::WorkflowSettings;
use crate::utils::geofence::AccuracyLeniency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StoreBackend {
    Mysql,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub store_backend: StoreBackend,
    /// Required for the mysql backend.
    pub database_url: Option<String>,
    /// Optional JSON seed for the memory backend.
    pub store_seed_file: Option<String>,
    pub jwt_secret: String,
    pub api_prefix: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    /// Site offset from UTC used to pick the work date.
    pub site_utc_offset: FixedOffset,
    /// Enables the low-accuracy re-check when set.
    pub lenient_accuracy_m: Option<f64>,
    pub project_cache_ttl: Duration,
    pub log_dir: String,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} has invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let store_backend = parse_or(&lookup, "STORE_BACKEND", StoreBackend::Mysql)?;
        let database_url = lookup("DATABASE_URL");
        if store_backend == StoreBackend::Mysql && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORE_BACKEND=mysql");
        }

        let offset_minutes: i32 = parse_or(&lookup, "SITE_UTC_OFFSET_MINUTES", 0)?;
        let site_utc_offset = FixedOffset::east_opt(offset_minutes * 60)
            .with_context(|| format!("SITE_UTC_OFFSET_MINUTES out of range: {offset_minutes}"))?;

        let lenient_accuracy_m = match lookup("GEOFENCE_LENIENT_ACCURACY_M") {
            Some(raw) => {
                let value: f64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("GEOFENCE_LENIENT_ACCURACY_M has invalid value '{raw}'"))?;
                if !value.is_finite() || value <= 0.0 {
                    bail!("GEOFENCE_LENIENT_ACCURACY_M must be a positive number of meters");
                }
                Some(value)
            }
            None => None,
        };

        Ok(Self {
            server_addr: lookup("SERVER_ADDR").context("SERVER_ADDR must be set")?,
            store_backend,
            database_url,
            store_seed_file: lookup("STORE_SEED_FILE"),
            jwt_secret: lookup("JWT_SECRET").context("JWT_SECRET must be set")?,
            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),
            rate_protected_per_min: parse_or(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,
            site_utc_offset,
            lenient_accuracy_m,
            project_cache_ttl: Duration::from_secs(parse_or(&lookup, "PROJECT_CACHE_TTL_SECS", 300)?),
            log_dir: lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
        })
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            utc_offset: self.site_utc_offset,
            accuracy_leniency: self
                .lenient_accuracy_m
                .map(|threshold| AccuracyLeniency { threshold }),
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            server_addr: "127.0.0.1:0".to_string(),
            store_backend: StoreBackend::Memory,
            database_url: None,
            store_seed_file: None,
            jwt_secret: crate::auth::jwt::issue::SECRET.to_string(),
            api_prefix: "/api".to_string(),
            rate_protected_per_min: 1000,
            site_utc_offset: FixedOffset::east_opt(0).expect("zero offset"),
            lenient_accuracy_m: None,
            project_cache_ttl: Duration::from_secs(60),
            log_dir: "logs".to_string(),
        }
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn memory_backend_needs_no_database() {
        let config = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "0.0.0.0:8080"),
            ("JWT_SECRET", "s3cret"),
            ("STORE_BACKEND", "Memory"),
            ("SITE_UTC_OFFSET_MINUTES", "360"),
            ("GEOFENCE_LENIENT_ACCURACY_M", "150"),
        ]))
        .expect("valid config");

        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.rate_protected_per_min, 1000);
        let settings = config.workflow_settings();
        assert_eq!(settings.utc_offset.local_minus_utc(), 6 * 3600);
        assert_eq!(settings.accuracy_leniency.map(|l| l.threshold), Some(150.0));
    }

    #[test]
    fn mysql_backend_requires_database_url() {
        let err = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "0.0.0.0:8080"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .expect_err("missing url");
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let err = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "0.0.0.0:8080"),
            ("JWT_SECRET", "s3cret"),
            ("STORE_BACKEND", "memory"),
            ("RATE_PROTECTED_PER_MIN", "lots"),
        ]))
        .expect_err("bad number");
        assert!(err.to_string().contains("RATE_PROTECTED_PER_MIN"));
    }

    #[test]
    fn non_positive_leniency_is_rejected() {
        assert!(Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "0.0.0.0:8080"),
            ("JWT_SECRET", "s3cret"),
            ("STORE_BACKEND", "memory"),
            ("GEOFENCE_LENIENT_ACCURACY_M", "0"),
        ]))
        .is_err());
    }
}
