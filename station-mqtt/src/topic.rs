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

//! Topic construction.
//!
//! Observation names are used as-is; no escaping of `/`, `+` or `#` is done.

/// Observation name of the presence topic.
pub const STATUS_OBSERVATION: &str = "connection_status";
/// Retained presence payload while the uploader is publishing.
pub const STATUS_ONLINE: &str = "online";
/// Retained presence payload carried by the last will.
pub const STATUS_OFFLINE: &str = "offline";

/// Build the topic for one observation.
///
/// `outTemp` with unit `degree_F` and prefix `weather` becomes
/// `weather/outTemp_degree_F`. An absent unit drops the `_unit` suffix and an
/// absent or empty prefix drops the leading segment.
pub fn build_topic(observation: &str, unit: Option<&str>, prefix: Option<&str>) -> String {
    let base = match unit {
        Some(unit) if !unit.is_empty() => format!("{observation}_{unit}"),
        _ => observation.to_string(),
    };

    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}/{base}"),
        _ => base,
    }
}

/// Topic of the presence beacon and last will.
pub fn status_topic(prefix: Option<&str>) -> String {
    build_topic(STATUS_OBSERVATION, None, prefix)
}
