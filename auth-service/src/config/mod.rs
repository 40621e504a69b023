use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

/// Minimum signing-secret length accepted in production (HS256 key size).
const MIN_PROD_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
    pub otp: OtpConfig,
    pub smtp: SmtpConfig,
    pub timeouts: TimeoutConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Upper bound for token and session lifetimes (one year).
const MAX_CREDENTIAL_EXPIRY_HOURS: i64 = 24 * 366;
/// Upper bound for OTP lifetimes (one day).
const MAX_OTP_EXPIRY_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: SecretString,
    pub token_expiry_hours: i64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub expiry_hours: i64,
}

#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub expiry_minutes: i64,
    pub max_attempts: i32,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub store_seconds: u64,
    pub email_seconds: u64,
}

impl TimeoutConfig {
    pub fn store(&self) -> Duration {
        Duration::from_secs(self.store_seconds)
    }

    pub fn email(&self) -> Duration {
        Duration::from_secs(self.email_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let smtp_user = get_env("SMTP_USER", Some(""), is_prod)?;

        let config = AuthConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("auth-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "25", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            jwt: JwtConfig {
                // Never defaulted: a missing signing secret is fatal in every environment.
                secret: SecretString::new(get_env("JWT_SECRET", None, true)?),
                token_expiry_hours: parse_env("JWT_TOKEN_EXPIRY_HOURS", "24", is_prod)?,
            },
            session: SessionConfig {
                expiry_hours: parse_env("SESSION_EXPIRY_HOURS", "24", is_prod)?,
            },
            otp: OtpConfig {
                expiry_minutes: parse_env("OTP_EXPIRY_MINUTES", "10", is_prod)?,
                max_attempts: parse_env("OTP_MAX_ATTEMPTS", "5", is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: parse_env("SMTP_PORT", "587", is_prod)?,
                from: get_env("SMTP_FROM", Some(&smtp_user), is_prod)?,
                password: SecretString::new(get_env("SMTP_PASSWORD", Some(""), is_prod)?),
                user: smtp_user,
            },
            timeouts: TimeoutConfig {
                store_seconds: parse_env("STORE_TIMEOUT_SECONDS", "5", is_prod)?,
                email_seconds: parse_env("EMAIL_TIMEOUT_SECONDS", "10", is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "APP__PORT must be greater than 0"
            )));
        }

        if self.jwt.secret.expose_secret().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must not be empty"
            )));
        }

        if !(1..=MAX_CREDENTIAL_EXPIRY_HOURS).contains(&self.jwt.token_expiry_hours) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_TOKEN_EXPIRY_HOURS must be between 1 and {}",
                MAX_CREDENTIAL_EXPIRY_HOURS
            )));
        }

        if !(1..=MAX_CREDENTIAL_EXPIRY_HOURS).contains(&self.session.expiry_hours) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_EXPIRY_HOURS must be between 1 and {}",
                MAX_CREDENTIAL_EXPIRY_HOURS
            )));
        }

        if !(1..=MAX_OTP_EXPIRY_MINUTES).contains(&self.otp.expiry_minutes)
            || self.otp.max_attempts <= 0
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OTP_EXPIRY_MINUTES must be between 1 and {} and OTP_MAX_ATTEMPTS positive",
                MAX_OTP_EXPIRY_MINUTES
            )));
        }

        if self.database.max_connections == 0
            || self.database.min_connections > self.database.max_connections
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MAX_CONNECTIONS must be positive and >= DATABASE_MIN_CONNECTIONS"
            )));
        }

        if self.timeouts.store_seconds == 0 || self.timeouts.email_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "STORE_TIMEOUT_SECONDS and EMAIL_TIMEOUT_SECONDS must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.jwt.secret.expose_secret().len() < MIN_PROD_SECRET_BYTES {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be at least {} bytes in production",
                    MIN_PROD_SECRET_BYTES
                )));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(secret: &str) -> AuthConfig {
        AuthConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "auth-service".to_string(),
            service_version: "test".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: "postgres://localhost/auth".to_string(),
                max_connections: 25,
                min_connections: 1,
            },
            jwt: JwtConfig {
                secret: SecretString::new(secret.to_string()),
                token_expiry_hours: 24,
            },
            session: SessionConfig { expiry_hours: 24 },
            otp: OtpConfig {
                expiry_minutes: 10,
                max_attempts: 5,
            },
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 25,
                user: String::new(),
                password: SecretString::new(String::new()),
                from: "noreply@example.com".to_string(),
            },
            timeouts: TimeoutConfig {
                store_seconds: 5,
                email_seconds: 10,
            },
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
        }
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            sample("").validate(),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn short_secret_is_rejected_in_prod_only() {
        let mut config = sample("short-secret");
        assert!(config.validate().is_ok());

        config.environment = Environment::Prod;
        assert!(config.validate().is_err());
    }

    #[test]
    fn wildcard_origin_is_rejected_in_prod() {
        let mut config = sample("0123456789abcdef0123456789abcdef");
        config.environment = Environment::Prod;
        config.security.allowed_origins = vec!["*".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_lifetimes_are_rejected() {
        let secret = "0123456789abcdef0123456789abcdef";

        let mut config = sample(secret);
        config.jwt.token_expiry_hours = i64::MAX;
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));

        let mut config = sample(secret);
        config.session.expiry_hours = MAX_CREDENTIAL_EXPIRY_HOURS + 1;
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));

        let mut config = sample(secret);
        config.otp.expiry_minutes = i64::MAX / 60;
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));

        let mut config = sample(secret);
        config.jwt.token_expiry_hours = MAX_CREDENTIAL_EXPIRY_HOURS;
        config.session.expiry_hours = MAX_CREDENTIAL_EXPIRY_HOURS;
        config.otp.expiry_minutes = MAX_OTP_EXPIRY_MINUTES;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn secret_is_redacted_in_debug_output() {
        let config = sample("super-secret-signing-key");
        assert!(!format!("{:?}", config).contains("super-secret-signing-key"));
    }

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
    }
}
