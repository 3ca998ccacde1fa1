use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Shortest accepted HMAC key for remember blobs and anti-forgery tokens.
const MIN_SECRET_LEN: usize = 32;

const DEV_REMEMBER_KEY: &str = "dev-only-remember-signing-key-change-me";
const DEV_CSRF_SECRET: &str = "dev-only-csrf-secret-key-change-me-please";

#[derive(Debug, Clone, Deserialize)]
pub struct SocialConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub session: SessionConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub remember_ttl_days: i64,
    pub session_ttl_seconds: u64,
    pub store_timeout_ms: u64,
}

impl SessionConfig {
    pub fn remember_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.remember_ttl_days)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    #[serde(skip_serializing)]
    pub remember_signing_key: String,
    #[serde(skip_serializing)]
    pub csrf_secret: String,
    pub csrf_token_ttl_seconds: i64,
    /// Mark cookies `Secure`; off only for plain-http local development.
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

impl SocialConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = SocialConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("social-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env(
                    "DATABASE_URL",
                    Some("postgres://localhost/social"),
                    is_prod,
                )?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1")?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            },
            session: SessionConfig {
                remember_ttl_days: parse_env("REMEMBER_TTL_DAYS", "30")?,
                session_ttl_seconds: parse_env("SESSION_TTL_SECONDS", "86400")?,
                store_timeout_ms: parse_env("STORE_TIMEOUT_MS", "2000")?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    false,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                remember_signing_key: get_env(
                    "REMEMBER_SIGNING_KEY",
                    Some(DEV_REMEMBER_KEY),
                    is_prod,
                )?,
                csrf_secret: get_env("CSRF_SECRET", Some(DEV_CSRF_SECRET), is_prod)?,
                csrf_token_ttl_seconds: parse_env("CSRF_TOKEN_TTL_SECONDS", "3600")?,
                secure_cookies: parse_env("SECURE_COOKIES", "true")?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "5")?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }
        if self.session.remember_ttl_days <= 0 {
            return Err(config_error("REMEMBER_TTL_DAYS must be positive"));
        }
        if self.session.session_ttl_seconds == 0 {
            return Err(config_error("SESSION_TTL_SECONDS must be positive"));
        }
        if self.session.store_timeout_ms == 0 {
            return Err(config_error("STORE_TIMEOUT_MS must be positive"));
        }
        if self.security.csrf_token_ttl_seconds <= 0 {
            return Err(config_error("CSRF_TOKEN_TTL_SECONDS must be positive"));
        }
        if self.security.remember_signing_key.len() < MIN_SECRET_LEN {
            return Err(config_error(&format!(
                "REMEMBER_SIGNING_KEY must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        if self.security.csrf_secret.len() < MIN_SECRET_LEN {
            return Err(config_error(&format!(
                "CSRF_SECRET must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        if self.rate_limit.login_attempts == 0 || self.rate_limit.login_window_seconds == 0 {
            return Err(config_error("Login rate limit must be positive"));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }
            if !self.security.secure_cookies {
                return Err(config_error("SECURE_COOKIES cannot be disabled in production"));
            }
            if self.security.remember_signing_key == DEV_REMEMBER_KEY
                || self.security.csrf_secret == DEV_CSRF_SECRET
            {
                return Err(config_error("Development secrets used in production"));
            }
        }

        Ok(())
    }
}

fn config_error(message: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.to_string()))
}

/// Read `key`; fall back to `default` unless the value is required.
fn get_env(key: &str, default: Option<&str>, required: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if required {
                Err(config_error(&format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(config_error(&format!("{} is required but not set", key)))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), false)?
        .trim()
        .parse()
        .map_err(|e: T::Err| config_error(&format!("{} is invalid: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
