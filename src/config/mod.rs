use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::session::SessionMode;

/// Default period of the access-code rotation task
pub const DEFAULT_CODE_ROTATION_SECS: u64 = 300;

/// Default period of the roster refresh task
pub const DEFAULT_ROSTER_REFRESH_SECS: u64 = 5;

/// Default per-request timeout; must stay below the roster refresh period so
/// two refresh calls are never in flight at once
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 4_000;

pub const DEFAULT_SERVER_PORT: u16 = 8090;

pub struct Config {
    pub server: ServerConfig,
    pub exam_service: ExamServiceConfig,
    pub session: SessionConfig,
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Connection settings for the exam service REST API
#[derive(Debug, Clone)]
pub struct ExamServiceConfig {
    pub base_url: String,
    /// Bearer token forwarded on every request
    pub api_token: Option<String>,
    pub request_timeout: Duration,
}

/// Timing and identity of one supervised session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_id: String,
    pub mode: SessionMode,
    pub code_rotation_interval: Duration,
    pub roster_refresh_interval: Duration,
    pub request_timeout: Duration,
}

impl SessionConfig {
    pub fn new(session_id: impl Into<String>, mode: SessionMode) -> Self {
        Self {
            session_id: session_id.into(),
            mode,
            code_rotation_interval: Duration::from_secs(DEFAULT_CODE_ROTATION_SECS),
            roster_refresh_interval: Duration::from_secs(DEFAULT_ROSTER_REFRESH_SECS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(SyncError::InvalidConfiguration(
                "session id must not be empty".to_string(),
            ));
        }
        if self.code_rotation_interval.is_zero() || self.roster_refresh_interval.is_zero() {
            return Err(SyncError::InvalidConfiguration(
                "polling intervals must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() || self.request_timeout >= self.roster_refresh_interval {
            return Err(SyncError::InvalidConfiguration(format!(
                "request timeout ({:?}) must be shorter than the roster refresh interval ({:?})",
                self.request_timeout, self.roster_refresh_interval
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Loads `.env` (if present) and then reads the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(SyncError::MissingConfiguration(key.to_string())),
            }
        };

        let parse_u64 = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(value) => value.trim().parse().map_err(|_| {
                    SyncError::InvalidConfiguration(format!("{} must be an integer, got {:?}", key, value))
                }),
                None => Ok(default),
            }
        };

        let port = match lookup("SERVER_PORT") {
            Some(value) => value.trim().parse().map_err(|_| {
                SyncError::InvalidConfiguration(format!("Invalid SERVER_PORT: {:?}", value))
            })?,
            None => DEFAULT_SERVER_PORT,
        };

        let mode = match lookup("SESSION_MODE") {
            Some(value) => value.parse()?,
            None => SessionMode::Active,
        };

        let request_timeout = Duration::from_millis(parse_u64("REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?);

        let session = SessionConfig {
            session_id: required("EXAM_SESSION_ID")?,
            mode,
            code_rotation_interval: Duration::from_secs(parse_u64(
                "CODE_ROTATION_INTERVAL_SECS",
                DEFAULT_CODE_ROTATION_SECS,
            )?),
            roster_refresh_interval: Duration::from_secs(parse_u64(
                "ROSTER_REFRESH_INTERVAL_SECS",
                DEFAULT_ROSTER_REFRESH_SECS,
            )?),
            request_timeout,
        };
        session.validate()?;

        Ok(Self {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
            },
            exam_service: ExamServiceConfig {
                base_url: required("EXAM_API_URL")?.trim_end_matches('/').to_string(),
                api_token: lookup("EXAM_API_TOKEN").filter(|t| !t.is_empty()),
                request_timeout,
            },
            session,
        })
    }

    /// Control API listen address. Any literal IP is accepted; an
    /// unrecognized host name listens on every interface.
    pub fn bind_address(&self) -> SocketAddr {
        let ip = match self.server.host.trim() {
            "" => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
            host => host.parse().unwrap_or_else(|_| {
                tracing::warn!(host, "Unrecognized SERVER_HOST, listening on all interfaces");
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            }),
        };
        SocketAddr::new(ip, self.server.port)
    }
}
