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

//! Error types for the MQTT uploader.
//!
//! Only configuration and connection failures unwind out of the worker.
//! Publish failures are reported as [`crate::PublishStatus::Failure`] values
//! and never surface here.

use thiserror::Error;

/// Malformed MQTT settings. Raised before the worker is started.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("MQTT host is missing or empty")]
    MissingHost,

    #[error("MQTT user and password must be set together")]
    PartialCredentials,

    #[error("Invalid MQTT port: {0}")]
    InvalidPort(String),

    #[error("Invalid boolean for '{key}': {value}")]
    InvalidBool { key: String, value: String },

    #[error("Invalid number for '{key}': {value}")]
    InvalidNumber { key: String, value: String },

    #[error("Unknown unit system: {0} (expected US, METRIC or METRICWX)")]
    InvalidUnitSystem(String),
}

/// Failure to establish the initial broker connection.
///
/// Not retried by the client wrapper; the supervisor decides whether to try
/// again.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Failed to connect to MQTT server {host}:{port}: {source}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: rumqttc::ConnectionError,
    },

    #[error("Timed out connecting to MQTT server {host}:{port}")]
    Timeout { host: String, port: u16 },
}

/// A loop packet that cannot be published.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("Loop packet must be a JSON object")]
    NotAnObject,

    #[error("Loop packet has no 'usUnits' field")]
    MissingUnitSystem,

    #[error("Loop packet has an unknown 'usUnits' value: {0}")]
    UnknownUnitSystem(serde_json::Value),
}
