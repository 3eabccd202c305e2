use futures::future::join_all;
use std::time::Duration;

use super::{DeliveryPolicy, Sink, SinkError};
use crate::feed::{Entry, EntryIdentity};

/// One new entry awaiting delivery to every enabled sink.
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    pub feed_url: String,
    pub identity: EntryIdentity,
    pub entry: Entry,
}

/// Result of sending one task to one sink.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    /// Index into the task slice given to [`deliver`]
    pub task: usize,
    pub sink: String,
    pub result: Result<(), SinkError>,
}

#[derive(Debug, Clone, Default)]
pub struct DeliveryOptions {
    /// Pause between consecutive tasks; zero disables pacing.
    pub interval: Duration,
}

/// Every (task, sink) attempt made by [`deliver`], in task order.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub outcomes: Vec<DeliveryOutcome>,
    task_count: usize,
}

impl DeliveryReport {
    /// Whether task `task` counts as delivered under `policy`.
    ///
    /// A task with no attempts (no sinks enabled) is never delivered, under
    /// either policy, so it stays eligible for the next run.
    pub fn is_delivered(&self, task: usize, policy: DeliveryPolicy) -> bool {
        let mut attempts = self.outcomes.iter().filter(|o| o.task == task).peekable();
        if attempts.peek().is_none() {
            return false;
        }
        match policy {
            DeliveryPolicy::Any => attempts.any(|o| o.result.is_ok()),
            DeliveryPolicy::All => attempts.all(|o| o.result.is_ok()),
        }
    }

    /// Indices of delivered tasks under `policy`, ascending.
    pub fn delivered(&self, policy: DeliveryPolicy) -> Vec<usize> {
        (0..self.task_count)
            .filter(|&task| self.is_delivered(task, policy))
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeliveryOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }
}

/// Sends every task to every sink.
///
/// Tasks are processed in order; for each task all sinks are attempted
/// concurrently. A failure is recorded in the report and logged, and never
/// stops the remaining sinks or tasks.
pub async fn deliver(
    tasks: &[DeliveryTask],
    sinks: &[Box<dyn Sink>],
    options: &DeliveryOptions,
) -> DeliveryReport {
    let mut report = DeliveryReport {
        outcomes: Vec::with_capacity(tasks.len() * sinks.len()),
        task_count: tasks.len(),
    };

    if sinks.is_empty() {
        if !tasks.is_empty() {
            tracing::warn!(
                tasks = tasks.len(),
                "No sinks enabled, new entries left undelivered"
            );
        }
        return report;
    }

    for (idx, task) in tasks.iter().enumerate() {
        if idx > 0 && !options.interval.is_zero() {
            tokio::time::sleep(options.interval).await;
        }

        let attempts = sinks.iter().map(move |sink| async move {
            let result = sink.send(&task.entry).await;
            (sink.name().to_string(), result)
        });

        for (sink, result) in join_all(attempts).await {
            match &result {
                Ok(()) => tracing::info!(
                    sink = %sink,
                    feed = %task.feed_url,
                    identity = %task.identity,
                    "Delivered entry"
                ),
                Err(e) => tracing::warn!(
                    sink = %sink,
                    feed = %task.feed_url,
                    identity = %task.identity,
                    error = %e,
                    "Delivery failed"
                ),
            }
            report.outcomes.push(DeliveryOutcome {
                task: idx,
                sink,
                result,
            });
        }
    }

    report
}
