use std::env;
use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::message::DEFAULT_ICE_SEPARATOR;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_RELAY_URL: &str = "BEACH_DSS_URL";
pub const ENV_LOCAL_PEER: &str = "BEACH_DSS_LOCAL_PEER";
pub const ENV_REMOTE_PEER: &str = "BEACH_DSS_REMOTE_PEER";
pub const ENV_POLL_INTERVAL_MS: &str = "BEACH_DSS_POLL_INTERVAL_MS";
pub const ENV_ICE_SEPARATOR: &str = "BEACH_DSS_ICE_SEPARATOR";

/// Settings for one signaling session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingConfig {
    /// Base address of the relay; `data/<peer>` is appended per request.
    pub relay_url: Url,
    pub local_peer_id: String,
    /// Initial remote peer. The session can retarget it later.
    pub remote_peer_id: String,
    pub poll_interval: Duration,
    pub ice_separator: String,
    pub request_timeout: Duration,
}

impl SignalingConfig {
    pub fn builder() -> SignalingConfigBuilder {
        SignalingConfigBuilder::default()
    }

    /// Load from `BEACH_DSS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(url) = lookup(ENV_RELAY_URL) {
            builder = builder.relay_url(url);
        }
        if let Some(local) = lookup(ENV_LOCAL_PEER) {
            builder = builder.local_peer_id(local);
        }
        if let Some(remote) = lookup(ENV_REMOTE_PEER) {
            builder = builder.remote_peer_id(remote);
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            let ms = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    var: ENV_POLL_INTERVAL_MS,
                    value: raw.clone(),
                })?;
            builder = builder.poll_interval(Duration::from_millis(ms));
        }
        if let Some(separator) = lookup(ENV_ICE_SEPARATOR) {
            builder = builder.ice_separator(separator);
        }
        builder.build()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidRelayUrl {
                url: self.relay_url.to_string(),
                reason: "address cannot carry a path".into(),
            });
        }
        if self.local_peer_id.trim().is_empty() {
            return Err(ConfigError::EmptyPeerId("local"));
        }
        if self.remote_peer_id.trim().is_empty() {
            return Err(ConfigError::EmptyPeerId("remote"));
        }
        if self.ice_separator.is_empty() {
            return Err(ConfigError::EmptySeparator);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

/// Source of the local peer id when none is given explicitly.
pub type IdentityProvider = Box<dyn FnOnce() -> String + Send>;

pub struct SignalingConfigBuilder {
    relay_url: Option<String>,
    local_peer_id: Option<String>,
    identity: Option<IdentityProvider>,
    remote_peer_id: Option<String>,
    poll_interval: Duration,
    ice_separator: String,
    request_timeout: Duration,
}

impl Default for SignalingConfigBuilder {
    fn default() -> Self {
        Self {
            relay_url: None,
            local_peer_id: None,
            identity: None,
            remote_peer_id: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            ice_separator: DEFAULT_ICE_SEPARATOR.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl fmt::Debug for SignalingConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingConfigBuilder")
            .field("relay_url", &self.relay_url)
            .field("local_peer_id", &self.local_peer_id)
            .field("identity", &self.identity.as_ref().map(|_| "<provider>"))
            .field("remote_peer_id", &self.remote_peer_id)
            .field("poll_interval", &self.poll_interval)
            .field("ice_separator", &self.ice_separator)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl SignalingConfigBuilder {
    pub fn relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = Some(url.into());
        self
    }

    pub fn local_peer_id(mut self, id: impl Into<String>) -> Self {
        self.local_peer_id = Some(id.into());
        self
    }

    /// Consulted only when no explicit local peer id was set.
    pub fn local_peer_from<F>(mut self, provider: F) -> Self
    where
        F: FnOnce() -> String + Send + 'static,
    {
        self.identity = Some(Box::new(provider));
        self
    }

    pub fn remote_peer_id(mut self, id: impl Into<String>) -> Self {
        self.remote_peer_id = Some(id.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn ice_separator(mut self, separator: impl Into<String>) -> Self {
        self.ice_separator = separator.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<SignalingConfig, ConfigError> {
        let raw_url = self
            .relay_url
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingRelayUrl)?;
        let relay_url = Url::parse(raw_url.trim()).map_err(|err| ConfigError::InvalidRelayUrl {
            url: raw_url.clone(),
            reason: err.to_string(),
        })?;
        let local_peer_id = match (self.local_peer_id, self.identity) {
            (Some(id), _) => id,
            (None, Some(provider)) => provider(),
            (None, None) => String::new(),
        };
        let config = SignalingConfig {
            relay_url,
            local_peer_id,
            remote_peer_id: self.remote_peer_id.unwrap_or_default(),
            poll_interval: self.poll_interval,
            ice_separator: self.ice_separator,
            request_timeout: self.request_timeout,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn builder_applies_defaults() {
        let config = SignalingConfig::builder()
            .relay_url("http://127.0.0.1:3000")
            .local_peer_id("hololens")
            .remote_peer_id("desktop")
            .build()
            .expect("config");
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.ice_separator, "|");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.relay_url.as_str(), "http://127.0.0.1:3000/");
    }

    #[test]
    fn identity_provider_only_fills_missing_local_id() {
        let config = SignalingConfig::builder()
            .relay_url("http://relay")
            .local_peer_from(|| "generated".to_string())
            .remote_peer_id("remote")
            .build()
            .expect("config");
        assert_eq!(config.local_peer_id, "generated");

        let config = SignalingConfig::builder()
            .relay_url("http://relay")
            .local_peer_id("explicit")
            .local_peer_from(|| panic!("provider must not run"))
            .remote_peer_id("remote")
            .build()
            .expect("config");
        assert_eq!(config.local_peer_id, "explicit");
    }

    #[test]
    fn misconfiguration_fails_fast() {
        let base = || {
            SignalingConfig::builder()
                .relay_url("http://relay")
                .local_peer_id("a")
                .remote_peer_id("b")
        };
        assert_eq!(
            SignalingConfig::builder().local_peer_id("a").build(),
            Err(ConfigError::MissingRelayUrl)
        );
        assert_eq!(
            base().relay_url("   ").build(),
            Err(ConfigError::MissingRelayUrl)
        );
        assert!(matches!(
            base().relay_url("not a url").build(),
            Err(ConfigError::InvalidRelayUrl { .. })
        ));
        assert!(matches!(
            base().relay_url("mailto:relay@example.com").build(),
            Err(ConfigError::InvalidRelayUrl { .. })
        ));
        assert_eq!(
            base().local_peer_id(" ").build(),
            Err(ConfigError::EmptyPeerId("local"))
        );
        assert_eq!(
            base().remote_peer_id("").build(),
            Err(ConfigError::EmptyPeerId("remote"))
        );
        assert_eq!(
            base().ice_separator("").build(),
            Err(ConfigError::EmptySeparator)
        );
        assert_eq!(
            base().poll_interval(Duration::ZERO).build(),
            Err(ConfigError::ZeroInterval)
        );
    }

    #[test]
    fn lookup_reads_all_variables() {
        let config = SignalingConfig::from_lookup(lookup_from(&[
            (ENV_RELAY_URL, "https://dss.example.com/base/"),
            (ENV_LOCAL_PEER, "alice"),
            (ENV_REMOTE_PEER, "bob"),
            (ENV_POLL_INTERVAL_MS, "250"),
            (ENV_ICE_SEPARATOR, "~"),
        ]))
        .expect("config");
        assert_eq!(config.relay_url.as_str(), "https://dss.example.com/base/");
        assert_eq!(config.local_peer_id, "alice");
        assert_eq!(config.remote_peer_id, "bob");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.ice_separator, "~");
    }

    #[test]
    fn lookup_rejects_bad_interval() {
        let result = SignalingConfig::from_lookup(lookup_from(&[
            (ENV_RELAY_URL, "http://relay"),
            (ENV_LOCAL_PEER, "alice"),
            (ENV_REMOTE_PEER, "bob"),
            (ENV_POLL_INTERVAL_MS, "soon"),
        ]));
        assert_eq!(
            result,
            Err(ConfigError::InvalidValue {
                var: ENV_POLL_INTERVAL_MS,
                value: "soon".into(),
            })
        );
    }
}
