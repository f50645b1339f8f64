// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration types for the MQTT uploader.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use log::{debug, error};
use serde::Deserialize;

use crate::error::ConfigurationError;
use crate::lifecycle::RetryPolicy;
use crate::record::UnitSystem;

pub const DEFAULT_PORT: u16 = 1883;

const KEY_ENABLE: &str = "enable";
const KEY_HOST: &str = "host";
const KEY_PORT: &str = "port";
const KEY_USER: &str = "user";
const KEY_PASSWORD: &str = "password";
const KEY_TOPIC: &str = "topic";
const KEY_UNIT_SYSTEM: &str = "unit_system";
const KEY_LOG_SUCCESS: &str = "log_success";
const KEY_LOG_FAILURE: &str = "log_failure";
const KEY_MAX_TRIES: &str = "max_tries";
const KEY_RETRY_WAIT: &str = "retry_wait";

const KEYS: [&str; 11] = [
    KEY_ENABLE,
    KEY_HOST,
    KEY_PORT,
    KEY_USER,
    KEY_PASSWORD,
    KEY_TOPIC,
    KEY_UNIT_SYSTEM,
    KEY_LOG_SUCCESS,
    KEY_LOG_FAILURE,
    KEY_MAX_TRIES,
    KEY_RETRY_WAIT,
];

/// Value the installer writes for settings the operator still has to fill in.
const PLACEHOLDER: &str = "replace_me";

/// Raw `[MQTT]` settings section as key/value strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct RawSettings(HashMap<String, String>);

impl RawSettings {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Collect `MQTT_<KEY>` variables from the process environment.
    ///
    /// Returns `None` when none of them are set.
    pub fn from_env() -> Option<Self> {
        let settings = Self::from_pairs(KEYS.iter().filter_map(|key| {
            std::env::var(format!("MQTT_{}", key.to_ascii_uppercase()))
                .ok()
                .map(|value| (*key, value))
        }));
        (!settings.0.is_empty()).then_some(settings)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Trimmed value of `key`, or `None` when unset, blank or a placeholder.
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty() && *v != PLACEHOLDER)
    }

    fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigurationError> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(ConfigurationError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    fn get_number<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigurationError> {
        self.get(key)
            .map(|value| {
                value.parse::<T>().map_err(|_| ConfigurationError::InvalidNumber {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }
}

/// Verbosity toggles for publish outcomes.
///
/// Successes are logged at `debug`, failures at `error`, each only when its
/// toggle is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPolicy {
    pub log_success: bool,
    pub log_failure: bool,
}

impl LogPolicy {
    pub fn success(&self, message: fmt::Arguments<'_>) {
        if self.log_success {
            debug!("[mqtt] {message}");
        }
    }

    pub fn failure(&self, message: fmt::Arguments<'_>) {
        if self.log_failure {
            error!("[mqtt] {message}");
        }
    }
}

impl Default for LogPolicy {
    fn default() -> Self {
        Self {
            log_success: true,
            log_failure: true,
        }
    }
}

/// Broker credentials. Both halves are always present together.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &mask_password(&self.password))
            .finish()
    }
}

/// One `*` per character.
pub fn mask_password(password: &str) -> String {
    "*".repeat(password.chars().count())
}

/// Resolved uploader configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// MQTT broker hostname or IP.
    pub host: String,
    /// MQTT broker port (default: 1883).
    pub port: u16,
    pub credentials: Option<Credentials>,
    /// Prefix prepended to every topic.
    pub topic_prefix: Option<String>,
    /// Unit system packets are converted to before publishing. `None`
    /// publishes packets in the system they arrive in.
    pub unit_system: Option<UnitSystem>,
    pub log: LogPolicy,
    /// Connect attempts and back-off applied by the supervisor.
    pub retry: RetryPolicy,
}

impl Configuration {
    /// Start building a config for the given broker host.
    pub fn builder(host: impl Into<String>) -> ConfigurationBuilder {
        ConfigurationBuilder {
            host: host.into(),
            port: DEFAULT_PORT,
            user: None,
            password: None,
            topic_prefix: None,
            unit_system: None,
            log: LogPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Resolve the raw settings section.
    ///
    /// An absent or empty section, or `enable = false`, yields `Ok(None)`:
    /// the uploader is simply not configured.
    pub fn from_settings(
        settings: Option<&RawSettings>,
    ) -> Result<Option<Self>, ConfigurationError> {
        let Some(settings) = settings.filter(|s| !s.0.is_empty()) else {
            return Ok(None);
        };

        if !settings.get_bool(KEY_ENABLE, true)? {
            return Ok(None);
        }

        let result = Self::resolve(settings);
        if let Err(e) = &result {
            error!("[mqtt] Configuration error: {e}");
        }
        result.map(Some)
    }

    fn resolve(settings: &RawSettings) -> Result<Self, ConfigurationError> {
        let host = settings.get(KEY_HOST).ok_or(ConfigurationError::MissingHost)?;

        let port = match settings.get(KEY_PORT) {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigurationError::InvalidPort(raw.to_string()))?,
            None => DEFAULT_PORT,
        };

        let mut builder = Self::builder(host).port(port).log_policy(LogPolicy {
            log_success: settings.get_bool(KEY_LOG_SUCCESS, true)?,
            log_failure: settings.get_bool(KEY_LOG_FAILURE, true)?,
        });

        if let Some(user) = settings.get(KEY_USER) {
            builder = builder.user(user);
        }
        if let Some(password) = settings.get(KEY_PASSWORD) {
            builder = builder.password(password);
        }
        if let Some(topic) = settings.get(KEY_TOPIC) {
            builder = builder.topic_prefix(topic);
        }
        if let Some(unit_system) = settings.get(KEY_UNIT_SYSTEM) {
            builder = builder.unit_system(unit_system.parse()?);
        }

        let mut retry = RetryPolicy::default();
        if let Some(max_tries) = settings.get_number::<u32>(KEY_MAX_TRIES)? {
            retry.max_tries = max_tries.max(1);
        }
        if let Some(secs) = settings.get_number::<u64>(KEY_RETRY_WAIT)? {
            retry.retry_wait = Duration::from_secs(secs);
        }

        builder.retry_policy(retry).build()
    }
}

/// Builder for [`Configuration`].
pub struct ConfigurationBuilder {
    host: String,
    port: u16,
    user: Option<String>,
    password: Option<String>,
    topic_prefix: Option<String>,
    unit_system: Option<UnitSystem>,
    log: LogPolicy,
    retry: RetryPolicy,
}

impl ConfigurationBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = Some(prefix.into());
        self
    }

    pub fn unit_system(mut self, unit_system: UnitSystem) -> Self {
        self.unit_system = Some(unit_system);
        self
    }

    pub fn log_policy(mut self, log: LogPolicy) -> Self {
        self.log = log;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate and build the config.
    pub fn build(self) -> Result<Configuration, ConfigurationError> {
        if self.host.trim().is_empty() {
            return Err(ConfigurationError::MissingHost);
        }

        let credentials = match (self.user, self.password) {
            (Some(user), Some(password)) => Some(Credentials { user, password }),
            (None, None) => None,
            _ => return Err(ConfigurationError::PartialCredentials),
        };

        Ok(Configuration {
            host: self.host,
            port: self.port,
            credentials,
            topic_prefix: self.topic_prefix.filter(|p| !p.is_empty()),
            unit_system: self.unit_system,
            log: self.log,
            retry: self.retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> RawSettings {
        RawSettings::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_missing_section_is_not_configured() {
        assert_eq!(Configuration::from_settings(None).unwrap(), None);
        assert_eq!(Configuration::from_settings(Some(&RawSettings::default())).unwrap(), None);
    }

    #[test]
    fn test_disabled_section_is_not_configured() {
        let raw = settings(&[("enable", "false"), ("host", "replace_me")]);
        assert_eq!(Configuration::from_settings(Some(&raw)).unwrap(), None);
    }

    #[test]
    fn test_minimal_settings_use_defaults() {
        let config = Configuration::from_settings(Some(&settings(&[("host", "broker.local")])))
            .unwrap()
            .unwrap();

        assert_eq!(config.host, "broker.local");
        assert_eq!(config.port, 1883);
        assert_eq!(config.credentials, None);
        assert_eq!(config.topic_prefix, None);
        assert_eq!(config.unit_system, None);
        assert_eq!(config.log, LogPolicy::default());
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_full_settings() {
        let raw = settings(&[
            ("host", "10.0.0.5"),
            ("port", "8883"),
            ("user", "station"),
            ("password", "hunter2"),
            ("topic", "weather"),
            ("unit_system", "METRICWX"),
            ("log_success", "false"),
            ("log_failure", "yes"),
            ("max_tries", "5"),
            ("retry_wait", "2"),
        ]);
        let config = Configuration::from_settings(Some(&raw)).unwrap().unwrap();

        assert_eq!(config.port, 8883);
        assert_eq!(
            config.credentials,
            Some(Credentials {
                user: "station".into(),
                password: "hunter2".into()
            })
        );
        assert_eq!(config.topic_prefix.as_deref(), Some("weather"));
        assert_eq!(config.unit_system, Some(UnitSystem::MetricWx));
        assert!(!config.log.log_success);
        assert!(config.log.log_failure);
        assert_eq!(config.retry.max_tries, 5);
        assert_eq!(config.retry.retry_wait, Duration::from_secs(2));
    }

    #[test]
    fn test_missing_host_is_an_error() {
        let err = Configuration::from_settings(Some(&settings(&[("topic", "weather")])))
            .unwrap_err();
        assert_eq!(err, ConfigurationError::MissingHost);

        let err = Configuration::from_settings(Some(&settings(&[("host", "  ")]))).unwrap_err();
        assert_eq!(err, ConfigurationError::MissingHost);
    }

    #[test]
    fn test_user_without_password_is_an_error() {
        let raw = settings(&[("host", "broker"), ("user", "station")]);
        assert_eq!(
            Configuration::from_settings(Some(&raw)).unwrap_err(),
            ConfigurationError::PartialCredentials
        );
    }

    #[test]
    fn test_password_without_user_is_an_error() {
        let raw = settings(&[("host", "broker"), ("password", "secret")]);
        assert_eq!(
            Configuration::from_settings(Some(&raw)).unwrap_err(),
            ConfigurationError::PartialCredentials
        );
    }

    #[test]
    fn test_placeholder_values_count_as_absent() {
        let raw = settings(&[
            ("host", "broker"),
            ("user", "replace_me"),
            ("password", "replace_me"),
            ("topic", "replace_me"),
        ]);
        let config = Configuration::from_settings(Some(&raw)).unwrap().unwrap();
        assert_eq!(config.credentials, None);
        assert_eq!(config.topic_prefix, None);
    }

    #[test]
    fn test_invalid_values_name_the_key() {
        let raw = settings(&[("host", "broker"), ("port", "99999")]);
        assert_eq!(
            Configuration::from_settings(Some(&raw)).unwrap_err(),
            ConfigurationError::InvalidPort("99999".into())
        );

        let raw = settings(&[("host", "broker"), ("log_success", "maybe")]);
        assert_eq!(
            Configuration::from_settings(Some(&raw)).unwrap_err(),
            ConfigurationError::InvalidBool {
                key: "log_success".into(),
                value: "maybe".into()
            }
        );

        let raw = settings(&[("host", "broker"), ("unit_system", "SI")]);
        assert_eq!(
            Configuration::from_settings(Some(&raw)).unwrap_err(),
            ConfigurationError::InvalidUnitSystem("SI".into())
        );
    }

    #[test]
    fn test_settings_deserialize_from_json() {
        let raw: RawSettings =
            serde_json::from_str(r#"{"host": "broker", "topic": "home"}"#).unwrap();
        let config = Configuration::from_settings(Some(&raw)).unwrap().unwrap();
        assert_eq!(config.topic_prefix.as_deref(), Some("home"));
    }

    #[test]
    fn test_builder_validates_credentials() {
        assert!(Configuration::builder("broker").user("u").build().is_err());
        assert!(Configuration::builder("").build().is_err());
        let config = Configuration::builder("broker")
            .user("u")
            .password("p")
            .topic_prefix("")
            .build()
            .unwrap();
        assert!(config.credentials.is_some());
        assert_eq!(config.topic_prefix, None);
    }

    #[test]
    fn test_password_is_masked_in_debug_output() {
        let credentials = Credentials {
            user: "station".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("*******"));
        assert!(!rendered.contains("hunter2"));
        assert_eq!(mask_password("abc"), "***");
    }
}
