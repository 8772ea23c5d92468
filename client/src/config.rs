//! Connection settings, read from the environment.

use std::{str::FromStr, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{ClientError, Result};

pub static ENV_VAR_URL: &str = "ELASTICSEARCH_URL";
pub static ENV_VAR_USERNAME: &str = "ELASTICSEARCH_USERNAME";
pub static ENV_VAR_PASSWORD: &str = "ELASTICSEARCH_PASSWORD";
pub static ENV_VAR_AUTH_MODE: &str = "ELASTICSEARCH_AUTH_MODE";
pub static ENV_VAR_TIMEOUT: &str = "ELASTICSEARCH_TIMEOUT";

pub static CLOUD_PREFIX: &str = "cloud:";
pub const DEFAULT_TIMEOUT_SECS: u64 = 40;
const DEFAULT_CLOUD_PORT: u16 = 443;

/// How the username and password are presented to the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    BasicAuth,
    /// Username and password are an API key's id and secret
    ApiKey,
}

impl FromStr for AuthMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "basicauth" => Ok(AuthMode::BasicAuth),
            "apikey" => Ok(AuthMode::ApiKey),
            _ => Err(ClientError::Config(format!(
                "{} must be `basicauth` or `apikey`, found {:?}",
                ENV_VAR_AUTH_MODE, s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Cluster URL, or an Elastic Cloud ID prefixed with `cloud:`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_mode: AuthMode,
    pub timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key/value source, empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let url = var(ENV_VAR_URL)
            .ok_or_else(|| ClientError::Config(format!("{} is not set", ENV_VAR_URL)))?;
        let auth_mode = var(ENV_VAR_AUTH_MODE)
            .map(|mode| mode.parse::<AuthMode>())
            .transpose()?
            .unwrap_or_default();
        let timeout = match var(ENV_VAR_TIMEOUT) {
            Some(secs) => secs.parse::<u64>().map_err(|_| {
                ClientError::Config(format!(
                    "{} must be a whole number of seconds, found {:?}",
                    ENV_VAR_TIMEOUT, secs
                ))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Settings {
            url,
            username: var(ENV_VAR_USERNAME),
            password: var(ENV_VAR_PASSWORD),
            auth_mode,
            timeout: Duration::from_secs(timeout),
        })
    }

    pub fn is_cloud(&self) -> bool {
        self.url.starts_with(CLOUD_PREFIX)
    }

    /// Username and password, only when both are set
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.username.as_deref()?, self.password.as_deref()?))
    }

    /// The URL requests are sent to, decoding cloud IDs
    pub fn base_url(&self) -> Result<String> {
        match self.url.strip_prefix(CLOUD_PREFIX) {
            Some(cloud_id) => decode_cloud_id(cloud_id),
            None => Ok(self.url.clone()),
        }
    }
}

/// Decode an Elastic Cloud ID (`name:base64(host[:port]$es_uuid$kibana_uuid)`)
/// into the cluster's HTTPS URL.
pub fn decode_cloud_id(cloud_id: &str) -> Result<String> {
    let invalid = |reason: &str| ClientError::Config(format!("Invalid cloud ID: {}", reason));

    let (_, encoded) = cloud_id
        .split_once(':')
        .ok_or_else(|| invalid("expected `name:base64`"))?;
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|err| invalid(&err.to_string()))?;
    let decoded = String::from_utf8(decoded).map_err(|err| invalid(&err.to_string()))?;

    let mut parts = decoded.split('$');
    let (Some(host), Some(es_uuid)) = (parts.next(), parts.next()) else {
        return Err(invalid("expected `host$uuid`"));
    };
    if host.is_empty() || es_uuid.is_empty() {
        return Err(invalid("expected `host$uuid`"));
    }

    let (host, port) = match host.rsplit_once(':') {
        Some((host, port)) => (
            host,
            port.parse::<u16>()
                .map_err(|_| invalid(&format!("bad port {:?}", port)))?,
        ),
        None => (host, DEFAULT_CLOUD_PORT),
    };
    Ok(format!("https://{}.{}:{}", es_uuid, host, port))
}
