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

//! Service adapter binding the uploader to the acquisition engine.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::client::{Connector, MqttConnector};
use crate::config::{Configuration, RawSettings};
use crate::error::{ConfigurationError, ConnectError};
use crate::events::{BindingId, LoopPacketEvents};
use crate::lifecycle::Supervisor;
use crate::queue::record_queue;
use crate::record::Record;
use crate::units::Units;
use crate::worker::{PublishStats, PublishingWorker, WorkerState};

/// Running uploader: a bound packet handler plus the worker task behind it.
pub struct MqttService {
    events: Arc<dyn LoopPacketEvents>,
    binding: BindingId,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), ConnectError>>,
    state: watch::Receiver<WorkerState>,
    stats: Arc<PublishStats>,
}

impl MqttService {
    /// Resolve `settings` and, if the uploader is configured, start the
    /// worker and bind to new loop packets.
    ///
    /// `Ok(None)` means the uploader is not configured: nothing is bound
    /// and no worker is started. Must be called within a tokio runtime.
    pub fn initialize(
        events: Arc<dyn LoopPacketEvents>,
        settings: Option<&RawSettings>,
        units: Arc<dyn Units>,
    ) -> Result<Option<Self>, ConfigurationError> {
        match Configuration::from_settings(settings)? {
            Some(config) => Ok(Some(Self::start(events, config, units, MqttConnector))),
            None => {
                info!("[mqtt] No MQTT configuration; loop packets will not be uploaded");
                Ok(None)
            }
        }
    }

    /// Start the worker with an explicit connector.
    pub fn start<C: Connector + 'static>(
        events: Arc<dyn LoopPacketEvents>,
        config: Configuration,
        units: Arc<dyn Units>,
        connector: C,
    ) -> Self {
        config
            .log
            .success(format_args!("Initializing MQTT service"));
        info!(
            "[mqtt] Uploading loop packets to {}:{}",
            config.host, config.port
        );

        let (sender, queue) = record_queue();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let supervisor = Supervisor::new("mqtt", config.retry);
        let mut worker = PublishingWorker::new(connector, config.clone(), units);
        let state = worker.state();
        let stats = worker.stats();

        let task = tokio::spawn(async move {
            supervisor.run(&mut worker, queue, shutdown_rx).await
        });

        let log = config.log;
        let binding = events.bind(Box::new(move |record: &Record| {
            log.success(format_args!("New loop packet: {record:?}"));
            if sender.enqueue(record.clone()).is_err() {
                log.failure(format_args!("MQTT worker has stopped; loop packet dropped"));
            }
        }));

        Self {
            events,
            binding,
            shutdown_tx: Some(shutdown_tx),
            task,
            state,
            stats,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }

    pub fn stats(&self) -> Arc<PublishStats> {
        self.stats.clone()
    }

    /// Unbind from the engine, stop the worker and wait for it to finish.
    ///
    /// The record being published completes; records still queued are dropped.
    pub async fn shutdown(mut self) -> Result<(), ConnectError> {
        if !self.events.unbind(self.binding) {
            warn!("[mqtt] Loop packet handler was already unbound");
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!("[mqtt] Worker task failed: {e}");
                Ok(())
            }
        }
    }
}
