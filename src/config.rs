/*
 * Responsibility
 * - Load settings from the environment (.env via dotenvy) once at startup
 * - Validate them (a missing or invalid value aborts startup)
 * - Key material for token verification (exactly one source)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use url::Url;

use crate::services::auth::access_jwt::KeyMaterial;

pub const MAX_CLOCK_SKEW_SECONDS: u64 = 300;
pub const MIN_ROLE_SESSION_SECONDS: i32 = 900;
pub const MAX_ROLE_SESSION_SECONDS: i32 = 43_200;

const KEY_MATERIAL_VARS: &str = "JWT_SECRET|JWT_PUBLIC_KEY_PEM|JWT_JWKS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn from_value(value: Option<&str>) -> Self {
        match value.unwrap_or("development").to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub auth_issuer: String,
    pub auth_audience: String,
    pub key_material: KeyMaterial,
    pub clock_skew_seconds: u64,

    pub aws_region: String,
    pub sts_endpoint_url: Option<Url>,
    pub role_max_session_seconds: i32,
    pub role_assume_timeout: Duration,
    pub role_session_cache: bool,
    pub role_session_cache_capacity: usize,

    pub audit_window: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. `from_env` passes the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = parse_or(get("PORT"), 3000, "PORT")?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_value(get("APP_ENV").as_deref());

        let auth_issuer = get("AUTH_ISSUER").ok_or(ConfigError::Missing("AUTH_ISSUER"))?;
        let auth_audience = get("AUTH_AUDIENCE").ok_or(ConfigError::Missing("AUTH_AUDIENCE"))?;

        let key_material = key_material(
            get("JWT_SECRET"),
            get("JWT_PUBLIC_KEY_PEM"),
            get("JWT_JWKS"),
        )?;

        let clock_skew_seconds: u64 =
            parse_or(get("JWT_CLOCK_SKEW_SECONDS"), 30, "JWT_CLOCK_SKEW_SECONDS")?;
        if clock_skew_seconds > MAX_CLOCK_SKEW_SECONDS {
            return Err(ConfigError::Invalid("JWT_CLOCK_SKEW_SECONDS"));
        }

        let aws_region = get("AWS_REGION").ok_or(ConfigError::Missing("AWS_REGION"))?;

        let sts_endpoint_url = get("STS_ENDPOINT_URL")
            .map(|raw| Url::parse(raw.trim()))
            .transpose()
            .map_err(|_| ConfigError::Invalid("STS_ENDPOINT_URL"))?;
        if let Some(url) = &sts_endpoint_url
            && !matches!(url.scheme(), "http" | "https")
        {
            return Err(ConfigError::Invalid("STS_ENDPOINT_URL"));
        }

        let role_max_session_seconds: i32 = parse_or(
            get("ROLE_MAX_SESSION_SECONDS"),
            MIN_ROLE_SESSION_SECONDS,
            "ROLE_MAX_SESSION_SECONDS",
        )?;
        if !(MIN_ROLE_SESSION_SECONDS..=MAX_ROLE_SESSION_SECONDS)
            .contains(&role_max_session_seconds)
        {
            return Err(ConfigError::Invalid("ROLE_MAX_SESSION_SECONDS"));
        }

        let role_assume_timeout_ms: u64 =
            parse_or(get("ROLE_ASSUME_TIMEOUT_MS"), 5000, "ROLE_ASSUME_TIMEOUT_MS")?;
        if role_assume_timeout_ms == 0 {
            return Err(ConfigError::Invalid("ROLE_ASSUME_TIMEOUT_MS"));
        }

        let role_session_cache = match get("ROLE_SESSION_CACHE") {
            None => false,
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid("ROLE_SESSION_CACHE"))?,
        };

        let role_session_cache_capacity: usize = parse_or(
            get("ROLE_SESSION_CACHE_CAPACITY"),
            1024,
            "ROLE_SESSION_CACHE_CAPACITY",
        )?;
        if role_session_cache_capacity == 0 {
            return Err(ConfigError::Invalid("ROLE_SESSION_CACHE_CAPACITY"));
        }

        let audit_window_seconds: u64 =
            parse_or(get("AUDIT_WINDOW_SECONDS"), 3600, "AUDIT_WINDOW_SECONDS")?;
        if audit_window_seconds == 0 {
            return Err(ConfigError::Invalid("AUDIT_WINDOW_SECONDS"));
        }

        Ok(Self {
            addr,
            app_env,
            auth_issuer,
            auth_audience,
            key_material,
            clock_skew_seconds,
            aws_region,
            sts_endpoint_url,
            role_max_session_seconds,
            role_assume_timeout: Duration::from_millis(role_assume_timeout_ms),
            role_session_cache,
            role_session_cache_capacity,
            audit_window: Duration::from_secs(audit_window_seconds),
        })
    }
}

fn parse_or<T: FromStr>(
    raw: Option<String>,
    default: T,
    key: &'static str,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn key_material(
    secret: Option<String>,
    public_pem: Option<String>,
    jwks: Option<String>,
) -> Result<KeyMaterial, ConfigError> {
    match (secret, public_pem, jwks) {
        (Some(secret), None, None) => Ok(KeyMaterial::SharedSecret(secret.into_bytes())),
        (None, Some(pem), None) => Ok(KeyMaterial::Ed25519PublicPem(pem.replace("\\n", "\n"))),
        (None, None, Some(jwks)) => {
            let set: JwkSet =
                serde_json::from_str(&jwks).map_err(|_| ConfigError::Invalid("JWT_JWKS"))?;
            Ok(KeyMaterial::JwkSet(set))
        }
        (None, None, None) => Err(ConfigError::Missing(KEY_MATERIAL_VARS)),
        _ => Err(ConfigError::Invalid(KEY_MATERIAL_VARS)),
    }
}
