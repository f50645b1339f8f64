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

//! MQTT uploader for weather-station loop packets.
//!
//! Every loop packet produced by the acquisition engine is handed to a
//! background worker which publishes each observation to its own topic
//! (`{prefix}/{observation}_{unit}`) together with a retained
//! `connection_status` presence beacon.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use station_mqtt::{EventDispatcher, MqttService, RawSettings, StandardUnits};
//!
//! let events = Arc::new(EventDispatcher::new());
//! let settings = RawSettings::from_pairs([("host", "broker.local"), ("topic", "weather")]);
//!
//! let service = MqttService::initialize(events.clone(), Some(&settings), Arc::new(StandardUnits))?;
//! // The acquisition engine calls `events.dispatch(&record)` for every loop packet.
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod queue;
pub mod record;
pub mod service;
pub mod topic;
pub mod units;
pub mod worker;

pub use client::{BrokerClient, BrokerSession, Connector, MqttConnector, Publish, PublishStatus};
pub use config::{Configuration, ConfigurationBuilder, LogPolicy, RawSettings};
pub use error::{ConfigurationError, ConnectError, RecordError};
pub use events::{BindingId, EventDispatcher, LoopPacketEvents};
pub use lifecycle::{RecordConsumer, RetryPolicy, Supervisor};
pub use queue::{record_queue, RecordQueue, RecordSender};
pub use record::{Record, UnitSystem};
pub use service::MqttService;
pub use units::{StandardUnits, UnitConverter, UnitResolver, Units};
pub use worker::{PublishStats, PublishingWorker, RecordPublisher, RecordReport, WorkerState};
