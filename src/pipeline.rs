//! One batch pass: fetch every feed, keep what history has not seen, deliver
//! it, record what was delivered, persist.
//!
//! History is only mutated here, sequentially, after all fetches and
//! deliveries have completed.

use std::collections::HashSet;
use std::time::Duration;

use crate::config::{Config, FeedSource};
use crate::feed::{fetch_all, identify, FeedOutcome, FetchOptions};
use crate::notify::{deliver, DeliveryOptions, DeliveryPolicy, DeliveryTask, Sink};
use crate::storage::{HistoryError, HistoryRecord, HistoryStore};

/// What to do with the entries that history has not seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Send to sinks and record what was delivered.
    Deliver,
    /// Log what would be sent; touch neither sinks nor history.
    DryRun,
    /// Record everything as delivered without sending (bootstraps history).
    MarkSeen,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub mode: RunMode,
    pub fetch: FetchOptions,
    pub fetch_concurrency: usize,
    /// Entries older than this, or undated, are ignored. `None` disables.
    pub max_entry_age: Option<Duration>,
    /// 0 = unlimited
    pub max_history_per_feed: usize,
    pub policy: DeliveryPolicy,
    pub delivery: DeliveryOptions,
}

impl PipelineOptions {
    pub fn from_config(config: &Config, mode: RunMode) -> Self {
        Self {
            mode,
            fetch: FetchOptions {
                timeout: Duration::from_secs(config.fetch_timeout_secs),
                ..FetchOptions::default()
            },
            fetch_concurrency: config.fetch_concurrency,
            max_entry_age: (config.max_entry_age_hours > 0)
                .then(|| Duration::from_secs(config.max_entry_age_hours.saturating_mul(3600))),
            max_history_per_feed: config.max_history_per_feed,
            policy: config.delivery_policy,
            delivery: DeliveryOptions {
                interval: Duration::from_millis(config.delivery_interval_ms),
            },
        }
    }
}

/// Counters describing a finished run, for the final log line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub feeds_total: usize,
    pub feeds_failed: usize,
    /// Entries not yet in history (after age filtering)
    pub new_entries: usize,
    /// Entries skipped by the age filter
    pub stale_entries: usize,
    /// Entries recorded into history this run
    pub recorded: usize,
    /// (entry, sink) attempts that failed
    pub failed_attempts: usize,
    pub history_saved: bool,
}

/// Runs one full pass.
///
/// `history` must already be loaded: a corrupt history aborts before any
/// network activity, which is the caller's responsibility.
///
/// # Errors
///
/// Only persisting history can fail the run. Feed and sink failures are
/// logged and counted in the summary.
pub async fn run(
    client: &reqwest::Client,
    sources: &[FeedSource],
    sinks: &[Box<dyn Sink>],
    store: &HistoryStore,
    mut history: HistoryRecord,
    options: &PipelineOptions,
) -> Result<RunSummary, HistoryError> {
    let mut summary = RunSummary {
        feeds_total: sources.len(),
        ..RunSummary::default()
    };

    let outcomes = fetch_all(client, sources, options.fetch_concurrency, options.fetch).await;
    summary.feeds_failed = outcomes.iter().filter(|o| o.result.is_err()).count();

    let now = chrono::Utc::now().timestamp();
    let (tasks, stale) = collect_tasks(outcomes, &history, now, options.max_entry_age);
    summary.new_entries = tasks.len();
    summary.stale_entries = stale;

    let recorded: Vec<&DeliveryTask> = match options.mode {
        RunMode::DryRun => {
            for task in &tasks {
                tracing::info!(
                    feed = %task.feed_url,
                    identity = %task.identity,
                    title = %task.entry.title,
                    "Would deliver"
                );
            }
            log_summary(&summary);
            return Ok(summary);
        }
        RunMode::MarkSeen => tasks.iter().collect(),
        RunMode::Deliver => {
            let report = deliver(&tasks, sinks, &options.delivery).await;
            summary.failed_attempts = report.failures().count();
            report
                .delivered(options.policy)
                .into_iter()
                .map(|idx| &tasks[idx])
                .collect()
        }
    };

    // Tasks follow feed order (newest first); record oldest first so the
    // history window evicts the oldest identities.
    for task in recorded.into_iter().rev() {
        if history.record(&task.feed_url, task.identity.clone()) {
            summary.recorded += 1;
        }
    }
    let pruned = history.prune(options.max_history_per_feed);
    if pruned > 0 {
        tracing::debug!(pruned = pruned, "Dropped identities beyond history window");
    }

    if summary.recorded > 0 || pruned > 0 {
        store.save(&history)?;
        summary.history_saved = true;
    }

    log_summary(&summary);
    Ok(summary)
}

/// Turns fetch outcomes into delivery tasks, in feed order then entry order.
///
/// Drops entries already in `history`, entries outside the age window, and
/// repeats of an identity within the same feed. Returns the tasks and the
/// number of entries dropped by the age window.
pub fn collect_tasks(
    outcomes: Vec<FeedOutcome>,
    history: &HistoryRecord,
    now: i64,
    max_age: Option<Duration>,
) -> (Vec<DeliveryTask>, usize) {
    let mut tasks = Vec::new();
    let mut queued = HashSet::new();
    let mut stale = 0;

    let max_age_secs = max_age.map(|age| i64::try_from(age.as_secs()).unwrap_or(i64::MAX));

    for outcome in outcomes {
        let Ok(entries) = outcome.result else {
            continue;
        };

        for entry in entries {
            if let Some(max_age_secs) = max_age_secs {
                let fresh = entry
                    .published
                    .is_some_and(|ts| now.saturating_sub(ts) <= max_age_secs);
                if !fresh {
                    stale += 1;
                    continue;
                }
            }

            let identity = identify(&entry);
            if history.contains(&outcome.url, &identity) {
                continue;
            }
            if !queued.insert((outcome.url.clone(), identity.clone())) {
                tracing::debug!(feed = %outcome.url, identity = %identity, "Duplicate entry in feed");
                continue;
            }

            tasks.push(DeliveryTask {
                feed_url: outcome.url.clone(),
                identity,
                entry,
            });
        }
    }

    (tasks, stale)
}

fn log_summary(summary: &RunSummary) {
    tracing::info!(
        feeds = summary.feeds_total,
        feeds_failed = summary.feeds_failed,
        new_entries = summary.new_entries,
        stale_entries = summary.stale_entries,
        recorded = summary.recorded,
        failed_attempts = summary.failed_attempts,
        history_saved = summary.history_saved,
        "Run complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Entry, EntryIdentity, FetchError, FetchFailed};
    use pretty_assertions::assert_eq;

    const NOW: i64 = 1_700_000_000;

    fn entry(n: u32, published: Option<i64>) -> Entry {
        Entry {
            title: format!("Entry {}", n),
            link: Some(format!("https://example.com/{}", n)),
            summary: None,
            published,
            source_label: "Example".to_string(),
        }
    }

    fn ok(url: &str, entries: Vec<Entry>) -> FeedOutcome {
        FeedOutcome {
            url: url.to_string(),
            result: Ok(entries),
        }
    }

    #[test]
    fn test_collect_skips_history_and_keeps_order() {
        let mut history = HistoryRecord::new();
        history.record("feed-a", EntryIdentity::from("https://example.com/2"));

        let outcomes = vec![
            ok("feed-a", vec![entry(3, None), entry(2, None), entry(1, None)]),
            FeedOutcome {
                url: "feed-b".to_string(),
                result: Err(FetchFailed {
                    url: "feed-b".to_string(),
                    source: FetchError::HttpStatus(500),
                }),
            },
            ok("feed-c", vec![entry(9, None)]),
        ];

        let (tasks, stale) = collect_tasks(outcomes, &history, NOW, None);
        let ids: Vec<_> = tasks.iter().map(|t| t.identity.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "https://example.com/3",
                "https://example.com/1",
                "https://example.com/9"
            ]
        );
        assert_eq!(stale, 0);
    }

    #[test]
    fn test_collect_history_is_per_feed() {
        let mut history = HistoryRecord::new();
        history.record("feed-a", EntryIdentity::from("https://example.com/1"));

        let (tasks, _) = collect_tasks(vec![ok("feed-b", vec![entry(1, None)])], &history, NOW, None);
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_collect_drops_duplicates_within_feed() {
        let outcomes = vec![ok("feed-a", vec![entry(1, None), entry(1, None)])];
        let (tasks, _) = collect_tasks(outcomes, &HistoryRecord::new(), NOW, None);
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_collect_age_window() {
        let day = Some(Duration::from_secs(24 * 3600));
        let outcomes = vec![ok(
            "feed-a",
            vec![
                entry(1, Some(NOW - 3600)),
                entry(2, Some(NOW - 3 * 24 * 3600)),
                entry(3, None),
            ],
        )];

        let (tasks, stale) = collect_tasks(outcomes, &HistoryRecord::new(), NOW, day);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].identity.as_str(), "https://example.com/1");
        assert_eq!(stale, 2);
    }

    #[test]
    fn test_options_from_config() {
        let config = Config {
            max_entry_age_hours: 24,
            delivery_policy: DeliveryPolicy::All,
            ..Config::default()
        };
        let options = PipelineOptions::from_config(&config, RunMode::Deliver);
        assert_eq!(options.max_entry_age, Some(Duration::from_secs(86_400)));
        assert_eq!(options.policy, DeliveryPolicy::All);
        assert_eq!(options.fetch.timeout, Duration::from_secs(30));

        let options = PipelineOptions::from_config(&Config::default(), RunMode::DryRun);
        assert_eq!(options.max_entry_age, None);
    }

    #[test]
    fn test_options_from_config_huge_age_saturates() {
        let config = Config {
            max_entry_age_hours: u64::MAX,
            ..Config::default()
        };
        let options = PipelineOptions::from_config(&config, RunMode::Deliver);
        assert_eq!(options.max_entry_age, Some(Duration::from_secs(u64::MAX)));

        let outcomes = vec![ok("feed-a", vec![entry(1, Some(0))])];
        let (tasks, stale) = collect_tasks(outcomes, &HistoryRecord::new(), NOW, options.max_entry_age);
        assert_eq!(tasks.len(), 1);
        assert_eq!(stale, 0);
    }
}
