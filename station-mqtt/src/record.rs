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

//! Loop packets and the unit systems their values are expressed in.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{ConfigurationError, RecordError};

/// Name of the field carrying a packet's unit system.
pub const UNIT_SYSTEM_FIELD: &str = "usUnits";

/// Unit convention of a loop packet, identified on the wire by its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitSystem {
    Us,
    Metric,
    MetricWx,
}

impl UnitSystem {
    pub fn code(self) -> i64 {
        match self {
            UnitSystem::Us => 1,
            UnitSystem::Metric => 16,
            UnitSystem::MetricWx => 17,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(UnitSystem::Us),
            16 => Some(UnitSystem::Metric),
            17 => Some(UnitSystem::MetricWx),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UnitSystem::Us => "US",
            UnitSystem::Metric => "METRIC",
            UnitSystem::MetricWx => "METRICWX",
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UnitSystem {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "US" => Ok(UnitSystem::Us),
            "METRIC" => Ok(UnitSystem::Metric),
            "METRICWX" => Ok(UnitSystem::MetricWx),
            _ => Err(ConfigurationError::InvalidUnitSystem(s.to_string())),
        }
    }
}

/// One loop packet: observation name to value, in insertion order.
///
/// The `usUnits` marker stays in the field map and is published like any
/// other observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
    unit_system: UnitSystem,
}

impl Record {
    pub fn new(fields: Map<String, Value>) -> Result<Self, RecordError> {
        let marker = fields
            .get(UNIT_SYSTEM_FIELD)
            .ok_or(RecordError::MissingUnitSystem)?;
        let unit_system = marker
            .as_i64()
            .or_else(|| marker.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .and_then(UnitSystem::from_code)
            .ok_or_else(|| RecordError::UnknownUnitSystem(marker.clone()))?;

        Ok(Self {
            fields,
            unit_system,
        })
    }

    /// Unit system named by the packet's own marker field.
    pub fn unit_system(&self) -> UnitSystem {
        self.unit_system
    }

    pub fn get(&self, observation: &str) -> Option<&Value> {
        self.fields.get(observation)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TryFrom<Value> for Record {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Record::new(map),
            _ => Err(RecordError::NotAnObject),
        }
    }
}

/// Text published for a single observation value.
///
/// Numbers use their shortest form, strings go out verbatim and a missing
/// reading (`null`) becomes an empty payload.
pub fn payload_for(value: &Value) -> Vec<u8> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => s.clone().into_bytes(),
        Value::Number(n) => n.to_string().into_bytes(),
        other => other.to_string().into_bytes(),
    }
}
