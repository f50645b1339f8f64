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

//! Hand-off queue between the acquisition thread and the publishing worker.
//!
//! The queue is unbounded so that enqueueing never blocks the acquisition
//! thread. While the broker is unreachable, memory grows with the backlog.

use tokio::sync::mpsc;

use crate::record::Record;

/// Producer half. Enqueueing is synchronous and never waits.
#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: mpsc::UnboundedSender<Record>,
}

/// Consumer half, owned by the publishing worker.
#[derive(Debug)]
pub struct RecordQueue {
    rx: mpsc::UnboundedReceiver<Record>,
}

/// Create a connected sender/queue pair.
pub fn record_queue() -> (RecordSender, RecordQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RecordSender { tx }, RecordQueue { rx })
}

impl RecordSender {
    /// Hand a record to the worker. Gives the record back if the worker is gone.
    pub fn enqueue(&self, record: Record) -> Result<(), Record> {
        self.tx.send(record).map_err(|e| e.0)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl RecordQueue {
    /// Wait for the next record. `None` once every sender has been dropped
    /// and the backlog is empty.
    pub async fn next(&mut self) -> Option<Record> {
        self.rx.recv().await
    }

    /// Stop accepting records; already queued records can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
