//! Environment-driven configuration.
//!
//! Everything the process needs is read once at boot via
//! [`AppConfig::from_env`]; missing required variables fail startup with the
//! variable named. Optional subsystems (Twilio, geocoding) may be absent in
//! development but are required when `ENVIRONMENT=production`.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable '{0}' is not set")]
    MissingVar(&'static str),

    #[error("environment variable '{name}' is invalid: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(s: &str) -> Self {
        match s {
            "production" => Environment::Production,
            "staging" => Environment::Staging,
            _ => Environment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally visible base URL, used to reconstruct the canonical URL
    /// Twilio signed (`X-Twilio-Signature` covers scheme and host).
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Key material sources for the token signer, in precedence order:
/// inline JSON, PEM pair from the environment, managed secret store.
/// The key store validates that at least one usable source exists.
#[derive(Debug, Clone, Default)]
pub struct JwtConfig {
    pub inline_keys_json: Option<String>,
    pub private_key_pem: Option<String>,
    pub public_key_pem: Option<String>,
    pub key_id: Option<String>,
    pub secret_arn: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub region: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub twilio: Option<TwilioConfig>,
    pub geocoder: Option<GeocoderConfig>,
}

const DEFAULT_GEOCODER_BASE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

impl AppConfig {
    /// Load configuration from process environment variables. `.env` files
    /// are honoured when present (development convenience).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Assemble configuration from an explicit variable map. Split out from
    /// [`from_env`](AppConfig::from_env) so tests do not mutate process
    /// state.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| vars.get(name).filter(|v| !v.is_empty()).cloned();
        let require =
            |name: &'static str| get(name).ok_or(ConfigError::MissingVar(name));

        let environment =
            Environment::parse(get("ENVIRONMENT").as_deref().unwrap_or("development"));

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidVar {
                name: "PORT",
                reason: format!("'{raw}' is not a valid port"),
            })?,
            None => 8080,
        };

        let server = ServerConfig {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{port}")),
        };

        let database = DatabaseConfig {
            url: require("DATABASE_URL")?,
            min_connections: parse_u32(vars, "DATABASE_MIN_CONNECTIONS", 2)?,
            max_connections: parse_u32(vars, "DATABASE_MAX_CONNECTIONS", 10)?.min(20),
        };

        let redis = RedisConfig { url: require("REDIS_URL")? };

        let jwt = JwtConfig {
            inline_keys_json: get("JWT_KEYS"),
            private_key_pem: get("JWT_PRIVATE_KEY"),
            public_key_pem: get("JWT_PUBLIC_KEY"),
            key_id: get("JWT_KEY_ID"),
            secret_arn: get("JWT_KEYS_SECRET_ARN"),
        };

        let storage = StorageConfig {
            region: require("AWS_REGION")?,
            bucket: require("S3_UPLOADS_BUCKET")?,
        };

        let twilio = match (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => {
                Some(TwilioConfig { account_sid, auth_token, from_number })
            }
            (None, None, None) if !environment.is_production() => None,
            _ => return Err(ConfigError::MissingVar("TWILIO_ACCOUNT_SID")),
        };

        let geocoder = match get("GEOCODER_API_KEY") {
            Some(api_key) => Some(GeocoderConfig {
                api_key,
                base_url: get("GEOCODER_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GEOCODER_BASE_URL.to_string()),
            }),
            None if !environment.is_production() => None,
            None => return Err(ConfigError::MissingVar("GEOCODER_API_KEY")),
        };

        Ok(Self { environment, server, database, redis, jwt, storage, twilio, geocoder })
    }
}

fn parse_u32(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    match vars.get(name).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse::<u32>().map_err(|_| ConfigError::InvalidVar {
            name,
            reason: format!("'{raw}' is not a valid number"),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        [
            ("DATABASE_URL", "postgres://localhost/berthcare"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("AWS_REGION", "ca-central-1"),
            ("S3_UPLOADS_BUCKET", "berthcare-uploads-dev"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_minimal_development_config() {
        let cfg = AppConfig::from_vars(&base_vars()).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.database.min_connections, 2);
        assert_eq!(cfg.database.max_connections, 10);
        assert!(cfg.twilio.is_none());
        assert!(cfg.geocoder.is_none());
    }

    #[test]
    fn test_missing_database_url_names_the_variable() {
        let mut vars = base_vars();
        vars.remove("DATABASE_URL");
        let err = AppConfig::from_vars(&vars).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_production_requires_twilio_and_geocoder() {
        let mut vars = base_vars();
        vars.insert("ENVIRONMENT".into(), "production".into());
        assert!(AppConfig::from_vars(&vars).is_err());

        vars.insert("TWILIO_ACCOUNT_SID".into(), "ACxxxx".into());
        vars.insert("TWILIO_AUTH_TOKEN".into(), "secret".into());
        vars.insert("TWILIO_PHONE_NUMBER".into(), "+15550100".into());
        vars.insert("GEOCODER_API_KEY".into(), "key".into());
        let cfg = AppConfig::from_vars(&vars).unwrap();
        assert!(cfg.twilio.is_some());
        assert_eq!(cfg.geocoder.unwrap().base_url, DEFAULT_GEOCODER_BASE_URL);
    }

    #[test]
    fn test_partial_twilio_config_is_an_error_even_in_dev() {
        let mut vars = base_vars();
        vars.insert("TWILIO_ACCOUNT_SID".into(), "ACxxxx".into());
        assert!(AppConfig::from_vars(&vars).is_err());
    }

    #[test]
    fn test_max_connections_is_capped() {
        let mut vars = base_vars();
        vars.insert("DATABASE_MAX_CONNECTIONS".into(), "50".into());
        let cfg = AppConfig::from_vars(&vars).unwrap();
        assert_eq!(cfg.database.max_connections, 20);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut vars = base_vars();
        vars.insert("PORT".into(), "eighty".into());
        assert!(AppConfig::from_vars(&vars).is_err());
    }
}
