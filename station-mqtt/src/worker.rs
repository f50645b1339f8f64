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

//! Publishing worker: connects a broker session and uploads queued records.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use tokio::sync::{oneshot, watch};

use crate::client::{BrokerSession, Connector, Publish};
use crate::config::{Configuration, LogPolicy};
use crate::error::ConnectError;
use crate::lifecycle::RecordConsumer;
use crate::queue::RecordQueue;
use crate::record::{payload_for, Record, UnitSystem};
use crate::topic::{build_topic, status_topic, STATUS_ONLINE};
use crate::units::Units;

/// Lifecycle of a [`PublishingWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Connecting,
    Running,
    Draining,
    Stopped,
    /// Initial connect failed and the supervisor gave up.
    Failed,
}

/// Publish counters shared between the worker and its owner.
#[derive(Debug, Default)]
pub struct PublishStats {
    records: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
    beacon_failures: AtomicU64,
}

impl PublishStats {
    fn record(&self, report: &RecordReport) {
        self.records.fetch_add(1, Ordering::Relaxed);
        self.published
            .fetch_add(report.succeeded as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        if !report.beacon_ok {
            self.beacon_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records drained so far.
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Observation publishes accepted by the client.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Observation publishes rejected by the client.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn beacon_failures(&self) -> u64 {
        self.beacon_failures.load(Ordering::Relaxed)
    }
}

/// Outcome of publishing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReport {
    pub beacon_ok: bool,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Turns a record into a presence beacon plus one publish per observation.
pub struct RecordPublisher {
    topic_prefix: Option<String>,
    unit_system: Option<UnitSystem>,
    log: LogPolicy,
    units: Arc<dyn Units>,
}

impl RecordPublisher {
    pub fn new(config: &Configuration, units: Arc<dyn Units>) -> Self {
        Self {
            topic_prefix: config.topic_prefix.clone(),
            unit_system: config.unit_system,
            log: config.log,
            units,
        }
    }

    pub fn status_topic(&self) -> String {
        status_topic(self.topic_prefix.as_deref())
    }

    /// Convert `record` to the configured unit system, if any, then publish it.
    pub async fn process_record(&self, client: &mut dyn Publish, record: Record) -> RecordReport {
        let record = match self.unit_system {
            Some(target) => self.units.convert(&record, target),
            None => record,
        };
        self.publish_record(client, &record).await
    }

    /// Publish the `online` beacon, then every field of `record`.
    ///
    /// Each field is published independently; a failure is logged and the
    /// remaining fields are still attempted.
    pub async fn publish_record(&self, client: &mut dyn Publish, record: &Record) -> RecordReport {
        let beacon_ok = self.publish_status(client).await;
        let unit_system = record.unit_system();
        let prefix = self.topic_prefix.as_deref();

        let mut report = RecordReport {
            beacon_ok,
            attempted: 0,
            succeeded: 0,
            failed: 0,
        };

        for (observation, value) in record.fields() {
            let unit = self.units.unit_name(observation, unit_system);
            let topic = build_topic(observation, unit.as_deref(), prefix);

            self.log.success(format_args!(
                "Publishing \"{topic}\": {value} ({})",
                unit.as_deref().unwrap_or("-")
            ));

            report.attempted += 1;
            match client.publish(&topic, payload_for(value), false).await {
                status if status.is_success() => report.succeeded += 1,
                status => {
                    report.failed += 1;
                    self.log
                        .failure(format_args!("Publish failed for \"{topic}\": {status}"));
                }
            }
        }

        report
    }

    async fn publish_status(&self, client: &mut dyn Publish) -> bool {
        let topic = self.status_topic();
        let status = client
            .publish(&topic, STATUS_ONLINE.as_bytes().to_vec(), true)
            .await;
        if !status.is_success() {
            self.log
                .failure(format_args!("Publish failed for \"{topic}\": {status}"));
        }
        status.is_success()
    }
}

/// Owns the broker session for one worker lifetime and drains the queue into it.
pub struct PublishingWorker<C: Connector> {
    connector: C,
    config: Configuration,
    publisher: RecordPublisher,
    session: Option<C::Session>,
    state: watch::Sender<WorkerState>,
    stats: Arc<PublishStats>,
}

impl<C: Connector> PublishingWorker<C> {
    pub fn new(connector: C, config: Configuration, units: Arc<dyn Units>) -> Self {
        let publisher = RecordPublisher::new(&config, units);
        let (state, _) = watch::channel(WorkerState::Idle);
        Self {
            connector,
            config,
            publisher,
            session: None,
            state,
            stats: Arc::new(PublishStats::default()),
        }
    }

    pub fn state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<PublishStats> {
        self.stats.clone()
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }
}

#[async_trait]
impl<C: Connector> RecordConsumer for PublishingWorker<C> {
    async fn connect(&mut self) -> Result<(), ConnectError> {
        self.set_state(WorkerState::Connecting);
        let mut session = self.connector.connect(&self.config).await?;

        self.config.log.success(format_args!("Starting MQTT client"));
        session.start_loop().await;
        self.session = Some(session);
        self.set_state(WorkerState::Running);
        Ok(())
    }

    async fn drain_loop(
        &mut self,
        queue: &mut RecordQueue,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Result<()> {
        if self.session.is_none() {
            anyhow::bail!("drain loop started without a broker session");
        }

        self.config.log.success(format_args!("Entering upload loop"));
        loop {
            tokio::select! {
                _ = &mut *shutdown => {
                    info!("[mqtt] Shutdown signal received");
                    break;
                }
                next = queue.next() => {
                    let Some(record) = next else {
                        info!("[mqtt] Record queue closed");
                        break;
                    };
                    if let Some(session) = self.session.as_mut() {
                        let report = self.publisher.process_record(session, record).await;
                        self.stats.record(&report);
                    }
                }
            }
        }
        self.config.log.success(format_args!("Exited upload loop"));
        Ok(())
    }

    async fn on_shutdown(&mut self) {
        self.set_state(WorkerState::Draining);
        if let Some(mut session) = self.session.take() {
            self.config.log.success(format_args!("Stopping MQTT client"));
            session.stop_loop().await;
        }
        self.set_state(WorkerState::Stopped);
    }

    fn on_give_up(&mut self) {
        self.set_state(WorkerState::Failed);
    }
}
