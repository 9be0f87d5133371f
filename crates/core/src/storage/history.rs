use crate::domain::history::HistoryEntry;
use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the single storage slot holding the ledger.
pub const LEDGER_SLOT: &str = "simulationHistory";

/// Append-only run ledger persisted as one JSON array, most-recent-first.
///
/// Every mutation rewrites the whole file through a temp file and a rename, so readers only
/// ever see a complete ledger. Two processes sharing a data directory are last-write-wins.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl HistoryStore {
    /// Opens the ledger in `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data dir {}", dir.display()))?;

        let mut store = Self {
            path: dir.join(format!("{LEDGER_SLOT}.json")),
            entries: Vec::new(),
        };
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reloads the ledger from disk.
    ///
    /// Content that is not a JSON array of entries is discarded together with the file and
    /// the ledger starts empty. Only I/O failures other than a missing file are returned.
    pub fn load(&mut self) -> anyhow::Result<()> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.entries = Vec::new();
                return Ok(());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read ledger {}", self.path.display()))
            }
        };

        match serde_json::from_slice::<Vec<HistoryEntry>>(&bytes) {
            Ok(entries) => {
                tracing::debug!(entries = entries.len(), path = %self.path.display(), "loaded history ledger");
                self.entries = entries;
            }
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    bytes = bytes.len(),
                    error = %err,
                    "history ledger is corrupt; discarding it"
                );
                self.entries = Vec::new();
                if let Err(e) = std::fs::remove_file(&self.path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(error = %e, "failed to remove corrupt ledger");
                    }
                }
            }
        }
        Ok(())
    }

    /// Most-recent-first.
    pub fn all(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, id: i64) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prepends one entry and persists. Returns the id it was stored under.
    pub fn append(&mut self, entry: HistoryEntry) -> anyhow::Result<i64> {
        let ids = self.append_batch(vec![entry])?;
        Ok(ids[0])
    }

    /// Prepends a batch (given oldest-first) and persists it in one write.
    ///
    /// Incoming ids must be strictly increasing. If the batch does not sort after every stored
    /// id, all of its ids are shifted forward by the same offset. Returns the stored ids in
    /// input order. On error the in-memory ledger is unchanged.
    pub fn append_batch(&mut self, mut batch: Vec<HistoryEntry>) -> anyhow::Result<Vec<i64>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        anyhow::ensure!(
            batch.windows(2).all(|w| w[0].id < w[1].id),
            "batch ids must be strictly increasing"
        );

        if let Some(max_stored) = self.entries.iter().map(|e| e.id).max() {
            let min_incoming = batch[0].id;
            if min_incoming <= max_stored {
                let offset = max_stored - min_incoming + 1;
                tracing::debug!(offset, "shifting incoming history ids to keep them unique");
                for entry in &mut batch {
                    entry.id += offset;
                }
            }
        }

        let ids: Vec<i64> = batch.iter().map(|e| e.id).collect();
        let mut next: Vec<HistoryEntry> = Vec::with_capacity(batch.len() + self.entries.len());
        next.extend(batch.into_iter().rev());
        next.extend(self.entries.iter().cloned());

        self.persist(&next)?;
        self.entries = next;
        Ok(ids)
    }

    /// Empties the ledger and removes its file.
    pub fn clear(&mut self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to remove ledger {}", self.path.display()))
            }
        }
        let removed = self.entries.len();
        self.entries.clear();
        tracing::info!(removed, "history ledger cleared");
        Ok(())
    }

    fn persist(&self, entries: &[HistoryEntry]) -> anyhow::Result<()> {
        let body = serde_json::to_vec(entries).context("failed to serialize history ledger")?;
        let tmp_path = self.path.with_extension("json.tmp");

        let written = write_synced(&tmp_path, &body).and_then(|()| {
            std::fs::rename(&tmp_path, &self.path).with_context(|| {
                format!(
                    "failed to move {} to {}",
                    tmp_path.display(),
                    self.path.display()
                )
            })
        });
        if written.is_err() {
            if let Err(e) = std::fs::remove_file(&tmp_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %tmp_path.display(), error = %e, "failed to remove temp ledger");
                }
            }
        }
        written
    }
}

fn write_synced(path: &Path, body: &[u8]) -> anyhow::Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(body)
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::baseline::{BaselineRecord, Period};
    use crate::domain::contract::{AllocationSplit, OptimizerResult, RevenueFigures};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn entry(id: i64, target: Period) -> HistoryEntry {
        HistoryEntry {
            id,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            baseline: BaselineRecord::default(),
            target,
            target_budget: 2_500_000_000.0,
            basis_budget: 2_500_000_000.0,
            result: OptimizerResult {
                expected: RevenueFigures::new(5.0, 3.0, 4.0),
                risk: RevenueFigures::new(0.5, 0.9, 0.1),
                allocation: AllocationSplit::new(40.0, 35.0, 25.0),
                total_growth: Some(1.25),
            },
        }
    }

    fn q(year: i32, quarter: u32) -> Period {
        Period::new(year, quarter).unwrap()
    }

    #[test]
    fn append_then_reload_is_most_recent_first() {
        let dir = tempdir().unwrap();
        let a = entry(1, q(2025, 1));
        let b = entry(2, q(2025, 2));

        let mut store = HistoryStore::open(dir.path()).unwrap();
        store.append(a.clone()).unwrap();
        store.append(b.clone()).unwrap();
        assert_eq!(store.all(), &[b.clone(), a.clone()]);

        let reopened = HistoryStore::open(dir.path()).unwrap();
        assert_eq!(reopened.all(), &[b, a]);
    }

    #[test]
    fn clear_removes_blob() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path()).unwrap();
        store.append(entry(1, q(2025, 1))).unwrap();
        assert!(store.path().exists());

        store.clear().unwrap();
        assert!(store.all().is_empty());
        assert!(!store.path().exists());

        let reopened = HistoryStore::open(dir.path()).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn failed_write_removes_temp_file_and_keeps_memory() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path()).unwrap();

        // A non-empty directory at the ledger path makes the final rename fail.
        std::fs::create_dir(store.path()).unwrap();
        std::fs::write(store.path().join("keep"), b"x").unwrap();

        assert!(store.append(entry(1, q(2025, 1))).is_err());
        assert!(store.is_empty());
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_ledger_loads_empty_and_is_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(format!("{LEDGER_SLOT}.json"));
        std::fs::write(&path, b"{not json").unwrap();

        let store = HistoryStore::open(dir.path()).unwrap();
        assert!(store.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn non_array_ledger_is_treated_as_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(format!("{LEDGER_SLOT}.json"));
        std::fs::write(&path, br#"{"entries": []}"#).unwrap();

        let store = HistoryStore::open(dir.path()).unwrap();
        assert!(store.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn colliding_ids_are_shifted_forward() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path()).unwrap();
        store.append(entry(100, q(2025, 1))).unwrap();

        let id = store.append(entry(100, q(2025, 2))).unwrap();
        assert_eq!(id, 101);

        let ids = store
            .append_batch(vec![entry(50, q(2025, 3)), entry(51, q(2025, 4))])
            .unwrap();
        assert_eq!(ids, vec![102, 103]);
        let stored: Vec<i64> = store.all().iter().map(|e| e.id).collect();
        assert_eq!(stored, vec![103, 102, 101, 100]);
    }

    #[test]
    fn rejects_unordered_batch_without_side_effects() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path()).unwrap();
        store.append(entry(1, q(2025, 1))).unwrap();

        let res = store.append_batch(vec![entry(5, q(2025, 2)), entry(5, q(2025, 3))]);
        assert!(res.is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(HistoryStore::open(dir.path()).unwrap().len(), 1);
    }
}
