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

//! Unit-name lookup and unit-system conversion.
//!
//! The worker only depends on the [`UnitResolver`] and [`UnitConverter`]
//! traits. [`StandardUnits`] is the built-in table covering the usual loop
//! observations; hosts with their own tables plug in their own types.

use serde_json::{Map, Number, Value};

use crate::record::{Record, UnitSystem, UNIT_SYSTEM_FIELD};

/// Maps an observation to the unit name it is expressed in.
pub trait UnitResolver: Send + Sync {
    /// `None` when the observation has no known unit.
    fn unit_name(&self, observation: &str, system: UnitSystem) -> Option<String>;
}

/// Converts a whole packet into another unit system.
pub trait UnitConverter: Send + Sync {
    fn convert(&self, record: &Record, target: UnitSystem) -> Record;
}

/// Both unit collaborators the worker needs.
pub trait Units: UnitResolver + UnitConverter {}

impl<T: UnitResolver + UnitConverter> Units for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Temperature,
    Pressure,
    Speed,
    Rain,
    RainRate,
    Altitude,
    Distance,
    Direction,
    Percent,
    Time,
    Interval,
    Radiation,
    Uv,
    Volt,
    Count,
}

fn group_of(observation: &str) -> Option<Group> {
    let group = match observation {
        "outTemp" | "inTemp" | "dewpoint" | "heatindex" | "windchill" | "appTemp"
        | "humidex" | "inDewpoint" => Group::Temperature,
        "barometer" | "pressure" | "altimeter" => Group::Pressure,
        "windSpeed" | "windGust" | "windSpeed10" => Group::Speed,
        "windDir" | "windGustDir" => Group::Direction,
        "outHumidity" | "inHumidity" | "rxCheckPercent" => Group::Percent,
        "rain" | "hail" | "ET" | "dayRain" | "monthRain" | "yearRain" | "stormRain"
        | "dayET" => Group::Rain,
        "rainRate" | "hailRate" => Group::RainRate,
        "dateTime" | "sunrise" | "sunset" => Group::Time,
        "interval" => Group::Interval,
        "radiation" | "maxSolarRad" => Group::Radiation,
        "UV" => Group::Uv,
        "consBatteryVoltage" | "heatingVoltage" | "referenceVoltage" | "supplyVoltage" => {
            Group::Volt
        }
        "altitude" | "cloudbase" => Group::Altitude,
        "windrun" => Group::Distance,
        "txBatteryStatus" | "windBatteryStatus" | "rainBatteryStatus"
        | "outTempBatteryStatus" | "inTempBatteryStatus" | "lightning_strike_count" => {
            Group::Count
        }
        other => return numbered_group(other),
    };
    Some(group)
}

/// Sensor families that come in numbered channels (`extraTemp1`, `leafWet2`).
fn numbered_group(observation: &str) -> Option<Group> {
    let family = observation.trim_end_matches(|c: char| c.is_ascii_digit());
    if family.len() == observation.len() {
        return None;
    }
    match family {
        "extraTemp" | "soilTemp" | "leafTemp" => Some(Group::Temperature),
        "extraHumid" => Some(Group::Percent),
        "leafWet" => Some(Group::Count),
        _ => None,
    }
}

fn unit_for(group: Group, system: UnitSystem) -> &'static str {
    use UnitSystem::*;
    match (group, system) {
        (Group::Temperature, Us) => "degree_F",
        (Group::Temperature, _) => "degree_C",
        (Group::Pressure, Us) => "inHg",
        (Group::Pressure, _) => "mbar",
        (Group::Speed, Us) => "mile_per_hour",
        (Group::Speed, Metric) => "km_per_hour",
        (Group::Speed, MetricWx) => "meter_per_second",
        (Group::Rain, Us) => "inch",
        (Group::Rain, Metric) => "cm",
        (Group::Rain, MetricWx) => "mm",
        (Group::RainRate, Us) => "inch_per_hour",
        (Group::RainRate, Metric) => "cm_per_hour",
        (Group::RainRate, MetricWx) => "mm_per_hour",
        (Group::Altitude, Us) => "foot",
        (Group::Altitude, _) => "meter",
        (Group::Distance, Us) => "mile",
        (Group::Distance, _) => "km",
        (Group::Direction, _) => "degree_compass",
        (Group::Percent, _) => "percent",
        (Group::Time, _) => "unix_epoch",
        (Group::Interval, _) => "minute",
        (Group::Radiation, _) => "watt_per_meter_squared",
        (Group::Uv, _) => "uv_index",
        (Group::Volt, _) => "volt",
        (Group::Count, _) => "count",
    }
}

/// Factor turning a value in `system` into the group's base unit.
///
/// Base units: mbar, meter_per_second, mm, mm_per_hour, meter, km.
/// Temperature has an offset and is handled in [`convert_value`]; groups
/// missing here are identical in every unit system.
fn base_factor(group: Group, system: UnitSystem) -> Option<f64> {
    use UnitSystem::*;
    let factor = match (group, system) {
        (Group::Pressure, Us) => 33.863_886_666_667,
        (Group::Pressure, _) => 1.0,
        (Group::Speed, Us) => 0.447_04,
        (Group::Speed, Metric) => 1.0 / 3.6,
        (Group::Speed, MetricWx) => 1.0,
        (Group::Rain | Group::RainRate, Us) => 25.4,
        (Group::Rain | Group::RainRate, Metric) => 10.0,
        (Group::Rain | Group::RainRate, MetricWx) => 1.0,
        (Group::Altitude, Us) => 0.3048,
        (Group::Altitude, _) => 1.0,
        (Group::Distance, Us) => 1.609_344,
        (Group::Distance, _) => 1.0,
        _ => return None,
    };
    Some(factor)
}

fn convert_value(group: Group, value: f64, from: UnitSystem, to: UnitSystem) -> Option<f64> {
    if group == Group::Temperature {
        let celsius = match from {
            UnitSystem::Us => (value - 32.0) * 5.0 / 9.0,
            _ => value,
        };
        return Some(match to {
            UnitSystem::Us => celsius * 9.0 / 5.0 + 32.0,
            _ => celsius,
        });
    }
    Some(value * base_factor(group, from)? / base_factor(group, to)?)
}

/// Built-in unit table for common loop observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardUnits;

impl UnitResolver for StandardUnits {
    fn unit_name(&self, observation: &str, system: UnitSystem) -> Option<String> {
        group_of(observation).map(|group| unit_for(group, system).to_string())
    }
}

impl UnitConverter for StandardUnits {
    fn convert(&self, record: &Record, target: UnitSystem) -> Record {
        let from = record.unit_system();
        if from == target {
            return record.clone();
        }

        let mut fields = Map::with_capacity(record.len());
        for (name, value) in record.fields() {
            let converted = if name == UNIT_SYSTEM_FIELD {
                Value::from(target.code())
            } else {
                let scaled = group_of(name)
                    .zip(value.as_f64())
                    .and_then(|(group, v)| convert_value(group, v, from, target));
                match scaled {
                    Some(v) => Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
                    None => value.clone(),
                }
            };
            fields.insert(name.clone(), converted);
        }

        // The marker was rewritten to a known code above.
        Record::new(fields).unwrap_or_else(|_| record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    fn approx(value: Option<&Value>, expected: f64) {
        let actual = value.and_then(Value::as_f64).unwrap();
        assert!((actual - expected).abs() < 1e-6, "{actual} != {expected}");
    }

    #[test]
    fn test_unit_names_per_system() {
        let units = StandardUnits;
        assert_eq!(units.unit_name("outTemp", UnitSystem::Us).as_deref(), Some("degree_F"));
        assert_eq!(units.unit_name("outTemp", UnitSystem::Metric).as_deref(), Some("degree_C"));
        assert_eq!(
            units.unit_name("windSpeed", UnitSystem::MetricWx).as_deref(),
            Some("meter_per_second")
        );
        assert_eq!(units.unit_name("rain", UnitSystem::Metric).as_deref(), Some("cm"));
        assert_eq!(units.unit_name("extraTemp2", UnitSystem::Us).as_deref(), Some("degree_F"));
    }

    #[test]
    fn test_unknown_observation_has_no_unit() {
        let units = StandardUnits;
        assert_eq!(units.unit_name("usUnits", UnitSystem::Us), None);
        assert_eq!(units.unit_name("stationName", UnitSystem::Us), None);
        assert_eq!(units.unit_name("extraTemp", UnitSystem::Us), None);
    }

    #[test]
    fn test_convert_us_to_metric() {
        let converted = StandardUnits.convert(
            &record(json!({
                "outTemp": 212.0,
                "barometer": 29.92,
                "windSpeed": 10.0,
                "rain": 1.0,
                "outHumidity": 55.0,
                "usUnits": 1
            })),
            UnitSystem::Metric,
        );

        assert_eq!(converted.unit_system(), UnitSystem::Metric);
        assert_eq!(converted.get("usUnits"), Some(&json!(16)));
        approx(converted.get("outTemp"), 100.0);
        approx(converted.get("barometer"), 1013.207_489_066_677);
        approx(converted.get("windSpeed"), 16.093_44);
        approx(converted.get("rain"), 2.54);
        approx(converted.get("outHumidity"), 55.0);
    }

    #[test]
    fn test_convert_metric_to_metricwx() {
        let converted = StandardUnits.convert(
            &record(json!({"windSpeed": 36.0, "rain": 0.5, "outTemp": 20.0, "usUnits": 16})),
            UnitSystem::MetricWx,
        );

        approx(converted.get("windSpeed"), 10.0);
        approx(converted.get("rain"), 5.0);
        approx(converted.get("outTemp"), 20.0);
    }

    #[test]
    fn test_convert_leaves_text_and_nulls() {
        let converted = StandardUnits.convert(
            &record(json!({"outTemp": null, "windDir": "N", "usUnits": 1})),
            UnitSystem::MetricWx,
        );

        assert_eq!(converted.get("outTemp"), Some(&Value::Null));
        assert_eq!(converted.get("windDir"), Some(&json!("N")));
    }

    #[test]
    fn test_convert_keeps_unit_free_integers() {
        let converted = StandardUnits.convert(
            &record(json!({"dateTime": 1700000000, "windDir": 180, "usUnits": 1})),
            UnitSystem::Metric,
        );

        assert_eq!(converted.get("dateTime"), Some(&json!(1700000000)));
        assert_eq!(converted.get("windDir"), Some(&json!(180)));
    }

    #[test]
    fn test_convert_to_same_system_is_identity() {
        let original = record(json!({"outTemp": 72.5, "usUnits": 1}));
        assert_eq!(StandardUnits.convert(&original, UnitSystem::Us), original);
    }
}
