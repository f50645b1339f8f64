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

//! Record-consumer lifecycle.
//!
//! A [`RecordConsumer`] knows how to connect, drain records and clean up.
//! The [`Supervisor`] owns the policy around it: how often to retry a failed
//! connect, and that cleanup always runs once draining has started.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use tokio::sync::oneshot;

use crate::error::ConnectError;
use crate::queue::RecordQueue;

/// Connect attempts before giving up, and the pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_tries: u32,
    pub retry_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 3,
            retry_wait: Duration::from_secs(5),
        }
    }
}

/// Something that consumes queued records over a connection.
#[async_trait]
pub trait RecordConsumer: Send {
    /// Establish the connection. Called again by the supervisor after a failure.
    async fn connect(&mut self) -> Result<(), ConnectError>;

    /// Process records until the queue closes or `shutdown` fires.
    async fn drain_loop(
        &mut self,
        queue: &mut RecordQueue,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Result<()>;

    /// Release the connection. Runs however the drain loop ended.
    async fn on_shutdown(&mut self);

    /// Called once the supervisor stops retrying a failed connect.
    fn on_give_up(&mut self) {}
}

/// Drives a [`RecordConsumer`] through connect, drain and shutdown.
pub struct Supervisor {
    name: String,
    policy: RetryPolicy,
}

impl Supervisor {
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
        }
    }

    /// Run the consumer to completion.
    ///
    /// Returns the last connect error when every attempt failed or a stop
    /// was requested while waiting to retry.
    pub async fn run<C: RecordConsumer>(
        &self,
        consumer: &mut C,
        mut queue: RecordQueue,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<(), ConnectError> {
        let name = &self.name;
        let max_tries = self.policy.max_tries.max(1);

        let mut attempt = 1;
        loop {
            match consumer.connect().await {
                Ok(()) => break,
                Err(e) if attempt >= max_tries => {
                    error!("[{name}] {e}; giving up after {attempt} attempt(s)");
                    consumer.on_give_up();
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "[{name}] {e}; retrying in {:?} (attempt {attempt} of {max_tries})",
                        self.policy.retry_wait
                    );
                    tokio::select! {
                        _ = &mut shutdown => {
                            info!("[{name}] Shutdown requested while waiting to reconnect");
                            consumer.on_give_up();
                            return Err(e);
                        }
                        _ = tokio::time::sleep(self.policy.retry_wait) => {}
                    }
                    attempt += 1;
                }
            }
        }

        let drained = consumer.drain_loop(&mut queue, &mut shutdown).await;
        consumer.on_shutdown().await;

        if let Err(e) = drained {
            error!("[{name}] Upload loop ended with an error: {e:#}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::record_queue;

    #[derive(Default)]
    struct ScriptedConsumer {
        failures_left: u32,
        connects: u32,
        drained: bool,
        shut_down: bool,
        gave_up: bool,
        drain_error: bool,
    }

    #[async_trait]
    impl RecordConsumer for ScriptedConsumer {
        async fn connect(&mut self) -> Result<(), ConnectError> {
            self.connects += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(ConnectError::Timeout {
                    host: "broker".into(),
                    port: 1883,
                });
            }
            Ok(())
        }

        async fn drain_loop(
            &mut self,
            _queue: &mut RecordQueue,
            _shutdown: &mut oneshot::Receiver<()>,
        ) -> Result<()> {
            self.drained = true;
            if self.drain_error {
                anyhow::bail!("unexpected");
            }
            Ok(())
        }

        async fn on_shutdown(&mut self) {
            self.shut_down = true;
        }

        fn on_give_up(&mut self) {
            self.gave_up = true;
        }
    }

    fn policy(max_tries: u32) -> RetryPolicy {
        RetryPolicy {
            max_tries,
            retry_wait: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_connected() {
        let mut consumer = ScriptedConsumer {
            failures_left: 2,
            ..Default::default()
        };
        let (_tx, queue) = record_queue();
        let (_stop, shutdown) = oneshot::channel();

        Supervisor::new("test", policy(3))
            .run(&mut consumer, queue, shutdown)
            .await
            .unwrap();

        assert_eq!(consumer.connects, 3);
        assert!(consumer.drained);
        assert!(consumer.shut_down);
        assert!(!consumer.gave_up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_tries() {
        let mut consumer = ScriptedConsumer {
            failures_left: 10,
            ..Default::default()
        };
        let (_tx, queue) = record_queue();
        let (_stop, shutdown) = oneshot::channel();

        let result = Supervisor::new("test", policy(2))
            .run(&mut consumer, queue, shutdown)
            .await;

        assert!(result.is_err());
        assert_eq!(consumer.connects, 2);
        assert!(consumer.gave_up);
        assert!(!consumer.drained);
        assert!(!consumer.shut_down);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_retry_wait() {
        let mut consumer = ScriptedConsumer {
            failures_left: 10,
            ..Default::default()
        };
        let (_tx, queue) = record_queue();
        let (stop, shutdown) = oneshot::channel();
        stop.send(()).unwrap();

        let result = Supervisor::new("test", policy(5))
            .run(&mut consumer, queue, shutdown)
            .await;

        assert!(result.is_err());
        assert_eq!(consumer.connects, 1);
        assert!(consumer.gave_up);
    }

    #[tokio::test]
    async fn test_shutdown_runs_after_drain_error() {
        let mut consumer = ScriptedConsumer {
            drain_error: true,
            ..Default::default()
        };
        let (_tx, queue) = record_queue();
        let (_stop, shutdown) = oneshot::channel();

        Supervisor::new("test", policy(1))
            .run(&mut consumer, queue, shutdown)
            .await
            .unwrap();

        assert!(consumer.drained);
        assert!(consumer.shut_down);
    }
}
