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

//! "New loop packet" notifications from the acquisition engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::record::Record;

/// Handler invoked synchronously on the acquisition thread.
pub type PacketHandler = Box<dyn Fn(&Record) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

/// Where loop-packet handlers are bound.
pub trait LoopPacketEvents: Send + Sync {
    fn bind(&self, handler: PacketHandler) -> BindingId;

    /// Returns `false` if the binding was already gone.
    fn unbind(&self, id: BindingId) -> bool;
}

/// In-process dispatcher for engines that emit packets from their own thread.
#[derive(Default)]
pub struct EventDispatcher {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(BindingId, PacketHandler)>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call every bound handler with `record`, in binding order.
    pub fn dispatch(&self, record: &Record) {
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (_, handler) in handlers.iter() {
            handler(record);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers
            .lock()
            .map(|h| h.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}

impl LoopPacketEvents for EventDispatcher {
    fn bind(&self, handler: PacketHandler) -> BindingId {
        let id = BindingId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, handler));
        id
    }

    fn unbind(&self, id: BindingId) -> bool {
        let mut handlers = self
            .handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = handlers.len();
        handlers.retain(|(bound, _)| *bound != id);
        handlers.len() != before
    }
}
