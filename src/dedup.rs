// =============================================================================
// dedup.rs - THE DEDUPLICATION FORTRESS (RENOVATED)
// =============================================================================
//
// Our last engine deduplicated with a rotating Bloom filter backed by an LRU
// cache. This one gets a list. A short, ordered, most-recent-first list of
// ids that lives in a JSON file and is rewritten in full every time it
// changes.
//
// The rules:
//
// 1. Loaded once. A missing or mangled file means we start with amnesia,
//    log a warning, and get on with our lives.
// 2. `add` on an id we already know is a no-op. No reordering, no write.
// 3. New ids go to the front. When the list outgrows its capacity the
//    single oldest id falls off the back.
// 4. Every successful add is written through to disk before `add` returns,
//    so a crash loses at most the record that was in flight.
// 5. If the write fails we log it and keep going. Memory is the source of
//    truth for the rest of the process.
//
// Single owner, no locks. The scheduler hands it to one poller at a time.
// =============================================================================

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// The bounded, persisted set of ids we have already dispatched.
#[derive(Debug)]
pub struct DedupStore {
    /// Most recent first.
    ids: VecDeque<String>,
    capacity: usize,
    path: PathBuf,
}

impl DedupStore {
    /// Load the store from `path`, starting empty if the file is absent or
    /// unreadable. Never fails.
    ///
    /// A persisted list longer than `capacity` (say, capacity was lowered
    /// between runs) is cut down to its newest `capacity` ids.
    pub fn load(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let capacity = capacity.max(1);

        let mut ids = match read_ids(&path) {
            Ok(Some(ids)) => {
                info!(
                    path = %path.display(),
                    count = ids.len(),
                    capacity = capacity,
                    "Dedup store loaded"
                );
                ids
            }
            Ok(None) => {
                info!(path = %path.display(), "No dedup store on disk yet, starting fresh");
                VecDeque::new()
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to read dedup store, starting with an empty memory"
                );
                VecDeque::new()
            }
        };
        ids.truncate(capacity);

        Self { ids, capacity, path }
    }

    /// Exact string membership.
    pub fn exists(&self, id: &str) -> bool {
        self.ids.iter().any(|seen| seen == id)
    }

    /// Remember `id`. Returns `true` if it was new and is now stored.
    ///
    /// Empty ids are refused: a record without an id can be dispatched, but
    /// there is nothing to remember it by.
    pub fn add(&mut self, id: &str) -> bool {
        if id.is_empty() {
            debug!("Refusing to remember a record without an id");
            return false;
        }
        if self.exists(id) {
            return false;
        }

        self.ids.push_front(id.to_string());
        if self.ids.len() > self.capacity {
            if let Some(evicted) = self.ids.pop_back() {
                debug!(evicted = %evicted, "Dedup store full, oldest id evicted");
            }
        }

        if let Err(e) = self.persist() {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to persist dedup store, carrying on in memory"
            );
        }
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ids, most recent first.
    #[cfg(test)]
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    fn persist(&self) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.ids)?;
        fs::write(&self.path, json)
    }
}

fn read_ids(path: &Path) -> io::Result<Option<VecDeque<String>>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let ids: VecDeque<String> = serde_json::from_str(&raw)?;
    Ok(Some(ids))
}
