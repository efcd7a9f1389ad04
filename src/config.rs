use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} missing")]
    Missing(&'static str),
    #[error("{0} must be base64")]
    NotBase64(&'static str),
    #[error("SESSION_KEY must decode to at least 32 bytes")]
    WeakSessionKey,
    #[error("{0} is not a valid number")]
    NotANumber(&'static str),
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub session_key: Vec<u8>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub smtp: Option<SmtpConfig>,
    pub app_url: String,
    pub bind_addr: String,
    pub cors_origin: Option<String>,
    pub workflow_signing_key: Option<String>,
    pub workflow_max_attempts: u32,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process env.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let database_url = non_empty("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let session_key_b64 = non_empty("SESSION_KEY").ok_or(ConfigError::Missing("SESSION_KEY"))?;
        let session_key = general_purpose::STANDARD
            .decode(session_key_b64.trim())
            .map_err(|_| ConfigError::NotBase64("SESSION_KEY"))?;
        if session_key.len() < 32 {
            return Err(ConfigError::WeakSessionKey);
        }

        let smtp = match non_empty("SMTP_HOST") {
            Some(host) => {
                let port = match non_empty("SMTP_PORT") {
                    Some(raw) => Some(raw.parse().map_err(|_| ConfigError::NotANumber("SMTP_PORT"))?),
                    None => None,
                };
                Some(SmtpConfig {
                    host,
                    port,
                    user: non_empty("SMTP_USER"),
                    pass: non_empty("SMTP_PASS"),
                    from: non_empty("SMTP_FROM").unwrap_or_else(|| "noreply@ticketflow.local".to_string()),
                })
            }
            None => None,
        };

        let workflow_max_attempts = match non_empty("WORKFLOW_MAX_ATTEMPTS") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| ConfigError::NotANumber("WORKFLOW_MAX_ATTEMPTS"))?
                .max(1),
            None => 3,
        };

        let bind_addr = non_empty("BIND_ADDR").unwrap_or_else(|| {
            let port = non_empty("PORT").unwrap_or_else(|| "3000".to_string());
            format!("0.0.0.0:{}", port)
        });

        let production = ["PRODUCTION", "RAILWAY_ENVIRONMENT", "RENDER", "FLY_APP_NAME"]
            .iter()
            .any(|key| get(key).is_some());

        Ok(Self {
            database_url,
            session_key,
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_model: non_empty("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            smtp,
            app_url: non_empty("APP_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            bind_addr,
            cors_origin: non_empty("CORS_ORIGIN"),
            workflow_signing_key: non_empty("WORKFLOW_SIGNING_KEY"),
            workflow_max_attempts,
            admin_email: non_empty("ADMIN_EMAIL"),
            admin_password: non_empty("ADMIN_PASSWORD"),
            production,
        })
    }
}
