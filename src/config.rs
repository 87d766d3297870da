// Runtime settings, read from the environment (and `.env`).

use crate::app::push::PushConfig;
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://localhost";
const DEFAULT_NAMESPACE: &str = "/services";
const DEFAULT_LOG_FILE: &str = "services-console.log";
const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    InvalidUrl { var: &'static str, reason: String },

    #[error("invalid {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub push_url: String,
    pub push_namespace: String,
    pub push_timeout: Duration,
    pub insecure_tls: bool,
    pub log_file: PathBuf,
}

impl Config {
    /// Reads `APPLIANCE_URL`, `APPLIANCE_PUSH_URL`, `APPLIANCE_PUSH_NAMESPACE`,
    /// `APPLIANCE_PUSH_TIMEOUT_SECS`, `APPLIANCE_INSECURE_TLS` and
    /// `SERVICES_CONSOLE_LOG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base = get("APPLIANCE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base).map_err(|e| ConfigError::InvalidUrl {
            var: "APPLIANCE_URL",
            reason: e.to_string(),
        })?;

        let push_url = match get("APPLIANCE_PUSH_URL") {
            Some(url) => {
                Url::parse(&url).map_err(|e| ConfigError::InvalidUrl {
                    var: "APPLIANCE_PUSH_URL",
                    reason: e.to_string(),
                })?;
                url
            }
            None => push_url_for(&base_url)?,
        };

        let mut push_namespace =
            get("APPLIANCE_PUSH_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        if !push_namespace.starts_with('/') {
            push_namespace.insert(0, '/');
        }

        let push_timeout = match get("APPLIANCE_PUSH_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "APPLIANCE_PUSH_TIMEOUT_SECS",
                        value,
                    });
                }
            },
            None => DEFAULT_PUSH_TIMEOUT,
        };

        // Appliances usually ship a self-signed certificate.
        let insecure_tls = match get("APPLIANCE_INSECURE_TLS") {
            Some(value) => parse_flag(&value).ok_or(ConfigError::InvalidValue {
                var: "APPLIANCE_INSECURE_TLS",
                value,
            })?,
            None => false,
        };

        let log_file = get("SERVICES_CONSOLE_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

        Ok(Self {
            base_url,
            push_url,
            push_namespace,
            push_timeout,
            insecure_tls,
            log_file,
        })
    }

    pub fn push(&self) -> PushConfig {
        PushConfig {
            url: self.push_url.clone(),
            namespace: self.push_namespace.clone(),
            connect_timeout: self.push_timeout,
            insecure_tls: self.insecure_tls,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Socket.io websocket endpoint on the same host as the REST API.
fn push_url_for(base: &Url) -> Result<String, ConfigError> {
    let scheme = match base.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ConfigError::InvalidUrl {
                var: "APPLIANCE_URL",
                reason: format!("unsupported scheme {}", other),
            });
        }
    };

    let mut url = base.clone();
    url.set_scheme(scheme).map_err(|()| ConfigError::InvalidUrl {
        var: "APPLIANCE_URL",
        reason: "cannot derive websocket url".into(),
    })?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=3&transport=websocket"));
    Ok(url.into())
}
