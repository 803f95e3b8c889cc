use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is invalid. `DATABASE_URL` is optional here.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is invalid. `DATABASE_URL` is optional here.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_flag = |var: &str, default: &str| -> Result<bool, ConfigError> {
        parse_bool(&or_default(var, default))
            .ok_or_else(|| invalid(var, "expected one of true/false/1/0/yes/no".to_string()))
    };

    let database_url = lookup("DATABASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty());
    let env = parse_environment(&or_default("KVD_ENV", "development"))?;

    let bind_addr = parse_addr("KVD_BIND_ADDR", "0.0.0.0:8080")?;
    let log_level = or_default("KVD_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("KVD_DB_MAX_CONNECTIONS", "5")?;
    let db_min_connections = parse_u32("KVD_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("KVD_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let base_url = or_default("KVD_BASE_URL", "https://www.kvd.se");
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(invalid(
            "KVD_BASE_URL",
            format!("\"{base_url}\" must start with http:// or https://"),
        ));
    }
    let listing_path = or_default("KVD_LISTING_PATH", "/stangda-auktioner");

    let scraper_request_timeout_secs = parse_u64("KVD_SCRAPER_REQUEST_TIMEOUT_SECS", "30")?;
    let scraper_user_agent = or_default("KVD_SCRAPER_USER_AGENT", "kvd-crawler/0.1");
    let scraper_inter_request_delay_ms = parse_u64("KVD_SCRAPER_INTER_REQUEST_DELAY_MS", "3000")?;
    let scraper_max_retries = parse_u32("KVD_SCRAPER_MAX_RETRIES", "3")?;
    let scraper_retry_backoff_base_secs = parse_u64("KVD_SCRAPER_RETRY_BACKOFF_BASE_SECS", "5")?;
    let scraper_lenient_json = parse_flag("KVD_SCRAPER_LENIENT_JSON", "true")?;

    let crawl_schedule = or_default("KVD_CRAWL_SCHEDULE", "0 0 5 * * *");
    if crawl_schedule.split_whitespace().count() != 6 {
        return Err(invalid(
            "KVD_CRAWL_SCHEDULE",
            format!("\"{crawl_schedule}\" is not a six-field cron expression"),
        ));
    }

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        base_url,
        listing_path,
        scraper_request_timeout_secs,
        scraper_user_agent,
        scraper_inter_request_delay_ms,
        scraper_max_retries,
        scraper_retry_backoff_base_secs,
        scraper_lenient_json,
        crawl_schedule,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "KVD_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
