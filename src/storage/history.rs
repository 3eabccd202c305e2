use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::EntryIdentity;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Failed to access history file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but does not hold a `{ feed: [identity, ...] }` document.
    /// Treating it as empty would re-deliver everything, so this is fatal.
    #[error("History file '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Previously delivered identities, keyed by feed URL.
///
/// Per feed, identities are kept in the order they were recorded (oldest
/// first) with no duplicates. Serializes as `{ "feed url": ["id", ...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryRecord {
    feeds: BTreeMap<String, Vec<EntryIdentity>>,
}

impl HistoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `identity` was already delivered for `feed_url`.
    pub fn contains(&self, feed_url: &str, identity: &EntryIdentity) -> bool {
        self.feeds
            .get(feed_url)
            .is_some_and(|ids| ids.contains(identity))
    }

    /// Marks `identity` as delivered for `feed_url`.
    ///
    /// Only mutates the in-memory record; persisting is the caller's decision.
    /// Returns false if the identity was already present.
    pub fn record(&mut self, feed_url: &str, identity: EntryIdentity) -> bool {
        let ids = self.feeds.entry(feed_url.to_string()).or_default();
        if ids.contains(&identity) {
            return false;
        }
        ids.push(identity);
        true
    }

    /// Keeps only the `max_per_feed` most recently recorded identities of each
    /// feed. `0` means unlimited. Returns the number of identities dropped.
    ///
    /// A dropped identity is forgotten: if its entry is still listed by the
    /// feed it will be delivered again, so the window must exceed the number
    /// of entries a feed publishes at once.
    pub fn prune(&mut self, max_per_feed: usize) -> usize {
        if max_per_feed == 0 {
            return 0;
        }
        let mut dropped = 0;
        for ids in self.feeds.values_mut() {
            if ids.len() > max_per_feed {
                let excess = ids.len() - max_per_feed;
                ids.drain(..excess);
                dropped += excess;
            }
        }
        dropped
    }

    /// Identities recorded for one feed, oldest first.
    pub fn identities(&self, feed_url: &str) -> &[EntryIdentity] {
        self.feeds.get(feed_url).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }

    /// Total identities across all feeds.
    pub fn len(&self) -> usize {
        self.feeds.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.values().all(Vec::is_empty)
    }
}

/// JSON-file persistence for [`HistoryRecord`].
///
/// Whole-document semantics: read everything once at startup, write
/// everything once at the end. Not safe for concurrent writers.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted record.
    ///
    /// - Missing file → empty record (first run)
    /// - Unparseable file → [`HistoryError::Corrupt`]
    pub fn load(&self) -> Result<HistoryRecord, HistoryError> {
        let content = match std::fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No history file yet, starting empty");
                return Ok(HistoryRecord::new());
            }
            Err(source) => {
                return Err(HistoryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let record: HistoryRecord =
            serde_json::from_slice(&content).map_err(|source| HistoryError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        tracing::debug!(
            path = %self.path.display(),
            feeds = record.feed_count(),
            identities = record.len(),
            "Loaded history"
        );
        Ok(record)
    }

    /// Replaces the persisted record with `record`.
    ///
    /// Writes to a uniquely named sibling temp file, syncs it, then renames it
    /// over the target, so a crash leaves either the old or the new document,
    /// never a truncated one.
    pub fn save(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let mut content = serde_json::to_vec_pretty(record)?;
        content.push(b'\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        atomic_write(&self.path, &content).map_err(|source| self.io_error(source))?;

        tracing::debug!(
            path = %self.path.display(),
            identities = record.len(),
            "Saved history"
        );
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Write-to-temp-then-rename so `dst` is never left partially written.
fn atomic_write(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};

    // Unpredictable temp name; `create_new` refuses to follow a planted symlink
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", random_suffix));

    let result = (|| {
        let mut temp_file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        temp_file.write_all(content)?;
        temp_file.sync_all()?;
        drop(temp_file);

        // On Windows, rename fails if destination exists
        #[cfg(windows)]
        if dst.exists() {
            std::fs::remove_file(dst)?;
        }

        std::fs::rename(&temp_path, dst)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("feedcast_history_test_{}", name));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn id(s: &str) -> EntryIdentity {
        EntryIdentity::from(s)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = test_dir("missing");
        let store = HistoryStore::new(dir.join("data.json"));

        let record = store.load().unwrap();
        assert!(record.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = test_dir("corrupt");
        let path = dir.join("data.json");
        std::fs::write(&path, "{\"https://a.example/rss\": [\"x\"").unwrap();

        let err = HistoryStore::new(&path).load().unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt { .. }));
        assert!(err.to_string().contains("corrupt"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_shape_is_corrupt() {
        let dir = test_dir("wrong_shape");
        let path = dir.join("data.json");
        std::fs::write(&path, "[\"id-1\", \"id-2\"]").unwrap();

        let err = HistoryStore::new(&path).load().unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt { .. }));

        std::fs::write(&path, "").unwrap();
        let err = HistoryStore::new(&path).load().unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_contains_and_record() {
        let mut record = HistoryRecord::new();
        assert!(!record.contains("feed-a", &id("1")));

        assert!(record.record("feed-a", id("1")));
        assert!(!record.record("feed-a", id("1")));
        assert!(record.contains("feed-a", &id("1")));

        // Identities are scoped per feed
        assert!(!record.contains("feed-b", &id("1")));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = test_dir("round_trip");
        let store = HistoryStore::new(dir.join("data.json"));

        let mut record = HistoryRecord::new();
        record.record("https://b.example/rss", id("https://b.example/2"));
        record.record("https://b.example/rss", id("https://b.example/1"));
        record.record("https://a.example/rss", id("sha256:abc"));
        store.save(&record).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(
            loaded.identities("https://b.example/rss"),
            &[id("https://b.example/2"), id("https://b.example/1")]
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_of_load_is_byte_identical() {
        let dir = test_dir("idempotent_save");
        let store = HistoryStore::new(dir.join("data.json"));

        let mut record = HistoryRecord::new();
        record.record("https://z.example/rss", id("z2"));
        record.record("https://z.example/rss", id("z1"));
        record.record("https://a.example/rss", id("a1"));
        store.save(&record).unwrap();
        let first = std::fs::read(store.path()).unwrap();

        store.save(&store.load().unwrap()).unwrap();
        let second = std::fs::read(store.path()).unwrap();
        assert_eq!(first, second);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_persisted_shape() {
        let dir = test_dir("shape");
        let store = HistoryStore::new(dir.join("data.json"));

        let mut record = HistoryRecord::new();
        record.record("https://a.example/rss", id("https://a.example/1"));
        store.save(&record).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "https://a.example/rss": ["https://a.example/1"] })
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_replaces_and_leaves_no_temp_files() {
        let dir = test_dir("replace");
        let store = HistoryStore::new(dir.join("data.json"));

        let mut record = HistoryRecord::new();
        record.record("feed", id("old"));
        store.save(&record).unwrap();

        let mut replacement = HistoryRecord::new();
        replacement.record("feed", id("new"));
        store.save(&replacement).unwrap();

        assert_eq!(store.load().unwrap(), replacement);
        let names: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["data.json".to_string()]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = test_dir("parent");
        let store = HistoryStore::new(dir.join("state").join("data.json"));

        store.save(&HistoryRecord::new()).unwrap();
        assert!(store.path().exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_prune_keeps_most_recent() {
        let mut record = HistoryRecord::new();
        for i in 0..5 {
            record.record("feed", id(&i.to_string()));
        }
        record.record("other", id("x"));

        assert_eq!(record.prune(0), 0);
        assert_eq!(record.prune(3), 2);
        assert_eq!(record.identities("feed"), &[id("2"), id("3"), id("4")]);
        assert_eq!(record.identities("other"), &[id("x")]);
    }
}
