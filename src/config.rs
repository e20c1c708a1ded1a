use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw daemon configuration as merged from defaults, files and environment.
#[derive(Clone, Deserialize, Serialize)]
pub struct Config {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_id: Option<String>,
    pub collection: String,
    pub status_field: String,
    pub available_value: String,
    pub offline_value: String,
    pub poll_period_ms: u64,
    pub request_timeout_ms: u64,
    /// Follow a single user instead of the whole available set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    /// Mark ourselves available at startup and offline at shutdown.
    pub publish_status: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_token: None,
            self_id: None,
            collection: "users".into(),
            status_field: "status".into(),
            available_value: "available".into(),
            offline_value: "offline".into(),
            poll_period_ms: 5000,
            request_timeout_ms: 15000,
            track: None,
            publish_status: false,
        }
    }
}

// The token never reaches the logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("self_id", &self.self_id)
            .field("collection", &self.collection)
            .field("status_field", &self.status_field)
            .field("available_value", &self.available_value)
            .field("offline_value", &self.offline_value)
            .field("poll_period_ms", &self.poll_period_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("track", &self.track)
            .field("publish_status", &self.publish_status)
            .finish()
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("presenced.toml"))
            .merge(Json::file("presenced.json"))
            .merge(Env::prefixed("PRESENCED_"))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // Support Docker-style secrets
        if let Ok(token_file) = std::env::var("PRESENCED_AUTH_TOKEN_FILE") {
            config.auth_token = Some(std::fs::read_to_string(token_file)?.trim().to_string());
        }

        Ok(config)
    }

    /// Settings captured by the poll loop at start.  Not validated here;
    /// [`PollConfig::validate`] runs when the loop starts.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            base_url: self.base_url.trim().trim_end_matches('/').to_string(),
            auth_token: self.auth_token.clone().unwrap_or_default(),
            self_id: self.self_id.clone().unwrap_or_default(),
            collection: self.collection.clone(),
            presence: Presence {
                field: self.status_field.clone(),
                available: self.available_value.clone(),
                offline: self.offline_value.clone(),
            },
            period: Duration::from_millis(self.poll_period_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

/// The status field and the values that mark a user available or offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub field: String,
    pub available: String,
    pub offline: String,
}

/// Immutable settings for one run of the poll loop.
#[derive(Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub base_url: String,
    pub auth_token: String,
    pub self_id: String,
    pub collection: String,
    pub presence: Presence,
    pub period: Duration,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for PollConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollConfig")
            .field("base_url", &self.base_url)
            .field("self_id", &self.self_id)
            .field("collection", &self.collection)
            .field("presence", &self.presence)
            .field("period", &self.period)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Reasons a poll loop refuses to start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("base URL is not set")]
    MissingBaseUrl,
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("auth token is not set")]
    MissingToken,
    #[error("self identifier is not set")]
    MissingSelfId,
    #[error("poll period must be greater than zero")]
    ZeroPeriod,
    #[error("cannot track our own identifier {0:?}")]
    TargetIsSelf(String),
}

impl PollConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason,
        };
        let url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(invalid(format!(
                "expected an http(s) URL, got scheme {:?}",
                url.scheme()
            )));
        }
        if self.auth_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.self_id.trim().is_empty() {
            return Err(ConfigError::MissingSelfId);
        }
        if self.period.is_zero() {
            return Err(ConfigError::ZeroPeriod);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn valid() -> PollConfig {
        Config {
            base_url: "https://db.example.com/".into(),
            auth_token: Some("tok".into()),
            self_id: Some("me".into()),
            ..Config::default()
        }
        .poll_config()
    }

    #[test]
    fn defaults_match_source_constants() {
        let cfg = Config::default().poll_config();
        assert_eq!(cfg.period, Duration::from_millis(5000));
        assert_eq!(cfg.request_timeout, Duration::from_millis(15000));
        assert_eq!(cfg.collection, "users");
        assert_eq!(cfg.presence.field, "status");
        assert_eq!(cfg.presence.available, "available");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(valid().base_url, "https://db.example.com");
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let mut cfg = valid();
        cfg.auth_token.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::MissingToken));

        let mut cfg = valid();
        cfg.self_id = "  ".into();
        assert_eq!(cfg.validate(), Err(ConfigError::MissingSelfId));
    }

    #[test]
    fn bad_url_and_zero_period_are_rejected() {
        let mut cfg = valid();
        cfg.base_url.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::MissingBaseUrl));

        let mut cfg = valid();
        cfg.base_url = "not a url".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidBaseUrl { .. })));

        for url in ["localhost:9000", "ftp://db.example.com", "mailto:db@example.com"] {
            let mut cfg = valid();
            cfg.base_url = url.into();
            assert!(
                matches!(cfg.validate(), Err(ConfigError::InvalidBaseUrl { .. })),
                "{} should be rejected",
                url
            );
        }

        let mut cfg = valid();
        cfg.base_url = "http://localhost:9000".into();
        assert_eq!(cfg.validate(), Ok(()));

        let mut cfg = valid();
        cfg.period = Duration::ZERO;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroPeriod));
    }

    #[test]
    fn debug_output_redacts_token() {
        let cfg = Config {
            auth_token: Some("super-secret".into()),
            ..Config::default()
        };
        assert!(!format!("{:?}", cfg).contains("super-secret"));
        assert!(!format!("{:?}", cfg.poll_config()).contains("super-secret"));
    }

    #[test]
    fn load_merges_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "presenced.toml",
                r#"
                    base_url = "https://db.example.com"
                    self_id = "me"
                    poll_period_ms = 1000
                "#,
            )?;
            jail.set_env("PRESENCED_AUTH_TOKEN", "from-env");
            jail.set_env("PRESENCED_TRACK", "u7");

            let cfg = Config::load().map_err(|e| e.to_string())?;
            assert_eq!(cfg.self_id.as_deref(), Some("me"));
            assert_eq!(cfg.auth_token.as_deref(), Some("from-env"));
            assert_eq!(cfg.track.as_deref(), Some("u7"));
            assert_eq!(cfg.poll_period_ms, 1000);
            assert_eq!(cfg.collection, "users");
            Ok(())
        });
    }

    #[test]
    fn token_file_overrides_token() {
        Jail::expect_with(|jail| {
            jail.create_file("token.txt", "  file-token\n")?;
            jail.set_env("PRESENCED_AUTH_TOKEN", "from-env");
            jail.set_env("PRESENCED_AUTH_TOKEN_FILE", "token.txt");

            let cfg = Config::load().map_err(|e| e.to_string())?;
            assert_eq!(cfg.auth_token.as_deref(), Some("file-token"));
            Ok(())
        });
    }
}
