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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use log::{error, info, warn};
use serde_json::json;
use station_mqtt::{
    EventDispatcher, MqttService, RawSettings, Record, StandardUnits, WorkerState,
};

const LOOP_INTERVAL: Duration = Duration::from_secs(2);

/// Synthetic loop packet in US units.
fn loop_packet(tick: u64) -> Result<Record> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs();
    let phase = (tick as f64 / 30.0).sin();

    let record = Record::try_from(json!({
        "dateTime": now,
        "usUnits": 1,
        "outTemp": 68.0 + 4.0 * phase,
        "outHumidity": 55.0 - 10.0 * phase,
        "barometer": 29.92,
        "windSpeed": 3.5 + phase.abs() * 6.0,
        "windDir": (tick * 7) % 360,
        "rain": 0.0,
    }))?;
    Ok(record)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting loop simulator...");

    // MQTT_HOST, MQTT_TOPIC, MQTT_UNIT_SYSTEM, ... configure the uploader.
    let settings = RawSettings::from_env();
    let events = Arc::new(EventDispatcher::new());

    let Some(service) =
        MqttService::initialize(events.clone(), settings.as_ref(), Arc::new(StandardUnits))?
    else {
        warn!("MQTT_HOST is not set; nothing to do");
        return Ok(());
    };

    // The acquisition engine runs on its own OS thread and never awaits.
    let running = Arc::new(AtomicBool::new(true));
    let engine = {
        let events = events.clone();
        let running = running.clone();
        thread::spawn(move || {
            let mut tick = 0;
            while running.load(Ordering::Relaxed) {
                match loop_packet(tick) {
                    Ok(record) => events.dispatch(&record),
                    Err(e) => warn!("Dropping malformed loop packet: {e}"),
                }
                tick += 1;
                thread::sleep(LOOP_INTERVAL);
            }
        })
    };

    let mut state = service.state_changes();
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
        }
        failed = state.wait_for(|s| *s == WorkerState::Failed) => match failed {
            Ok(_) => error!("MQTT uploader gave up connecting; stopping"),
            Err(_) => warn!("MQTT worker exited; stopping"),
        },
    }

    running.store(false, Ordering::Relaxed);
    let stats = service.stats();
    service.shutdown().await?;
    if !matches!(tokio::task::spawn_blocking(move || engine.join()).await, Ok(Ok(()))) {
        warn!("Acquisition thread panicked");
    }

    info!(
        "Uploaded {} loop packets ({} publishes, {} failed)",
        stats.records(),
        stats.published(),
        stats.failed()
    );
    Ok(())
}
