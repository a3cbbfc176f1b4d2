//! Waiting on long-running operations.
//!
//! The poller re-fetches an operation by name until it reports `done`,
//! sleeping between fetches with a growing interval. Two kinds of failure
//! are kept apart:
//!
//! * the fetch itself failing is returned as `Err` and may be retried by
//!   calling `wait` again;
//! * the operation finishing with an error is a final outcome, surfaced by
//!   [`OperationPoller::until_done`] as [`Error::OperationFailed`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::debug;

use crate::client::DatabaseAdmin;
use crate::config::PollConfig;
use crate::error::{Error, Result};
use crate::operation::{Operation, OperationResult, Status};

/// Progress events emitted while waiting.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started {
        name: String,
    },
    Polling {
        name: String,
        progress_percent: Option<i32>,
        elapsed: Duration,
    },
    Completed {
        name: String,
    },
    Failed {
        name: String,
        status: Status,
    },
}

/// Callback for progress updates, e.g. to drive a CLI status line.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

pub struct OperationPoller<'a> {
    client: &'a dyn DatabaseAdmin,
    config: PollConfig,
    on_progress: Option<ProgressCallback>,
}

impl<'a> OperationPoller<'a> {
    pub fn new(client: &'a dyn DatabaseAdmin, config: PollConfig) -> Self {
        Self {
            client,
            config,
            on_progress: None,
        }
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Polls `name` until it is done or `timeout` elapses. On timeout the
    /// latest pending snapshot is returned rather than an error, so the
    /// caller can decide whether to keep waiting.
    pub async fn wait(&self, name: &str, timeout: Option<Duration>) -> Result<Operation> {
        let start = Instant::now();
        let deadline = timeout.map(|t| start + t);
        let mut interval = self.config.initial_interval();

        self.emit(ProgressEvent::Started {
            name: name.to_string(),
        });

        loop {
            let operation = self.client.get_operation(name).await?;
            let elapsed = start.elapsed();

            match &operation.result {
                Some(OperationResult::Response(_)) => {
                    debug!(operation = name, ?elapsed, "operation completed");
                    self.emit(ProgressEvent::Completed {
                        name: name.to_string(),
                    });
                    return Ok(operation);
                }
                Some(OperationResult::Error(status)) => {
                    debug!(operation = name, %status, "operation failed");
                    self.emit(ProgressEvent::Failed {
                        name: name.to_string(),
                        status: status.clone(),
                    });
                    return Ok(operation);
                }
                None => {}
            }

            let progress_percent = progress_of(&operation);
            debug!(operation = name, ?progress_percent, ?elapsed, "operation pending");
            self.emit(ProgressEvent::Polling {
                name: name.to_string(),
                progress_percent,
                elapsed,
            });

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!(operation = name, "wait timed out, returning pending snapshot");
                        return Ok(operation);
                    }
                    interval.min(deadline - now)
                }
                None => interval,
            };
            tokio::time::sleep(pause).await;
            interval = self.config.next_interval(interval);
        }
    }

    /// Waits for `operation` without a deadline and decodes its response.
    pub async fn until_done<T: DeserializeOwned>(&self, operation: Operation) -> Result<T> {
        let operation = if operation.done() {
            operation
        } else {
            self.wait(&operation.name, None).await?
        };

        operation
            .response_as::<T>()?
            .ok_or_else(|| Error::MalformedOperation {
                name: operation.name.clone(),
                reason: "still pending after wait".to_string(),
            })
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.on_progress {
            callback(event);
        }
    }
}

fn progress_of(operation: &Operation) -> Option<i32> {
    operation
        .typed_metadata()
        .ok()
        .flatten()
        .and_then(|m| m.progress().map(|p| p.progress_percent))
}
