//! Dataset Inventory: one instance per extracted dump directory.
//!
//! Holds the dump file path and lazily computes the table-range index and
//! the topology lookup, caching both behind `OnceLock` so first-populate is
//! effectively mutex-guarded (the lock inside `OnceLock::get_or_try_init`)
//! and every subsequent read is lock-free (spec.md §4.2, §5 "Shared
//! resources"). A process-wide registry keyed by resolved path is exposed so
//! the orchestrator can share one inventory across a request's fan-out.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::dump::cell::Frame;
use crate::dump::reader::{build_index, read_table, DumpIndex};
use crate::dump::topology::TopologyLookup;
use crate::utils::ApiError;

pub struct DatasetInventory {
    dump_path: PathBuf,
    index: OnceLock<DumpIndex>,
    topology: OnceLock<TopologyLookup>,
}

impl DatasetInventory {
    pub fn new(dump_path: impl Into<PathBuf>) -> Self {
        Self { dump_path: dump_path.into(), index: OnceLock::new(), topology: OnceLock::new() }
    }

    /// Locate the single `*.db_csv` file under an extracted directory
    /// (mirrors `DatasetInventory.db_csv` in the source tool).
    pub fn discover(dataset_root: &Path) -> Result<Self, ApiError> {
        let mut matches: Vec<PathBuf> = std::fs::read_dir(dataset_root)
            .map_err(|e| {
                ApiError::dataset_not_found(format!(
                    "cannot read dataset dir {}: {e}",
                    dataset_root.display()
                ))
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "db_csv"))
            .collect();
        matches.sort();
        let path = matches.into_iter().next().ok_or_else(|| {
            ApiError::dataset_not_found(format!(
                "no .db_csv files under {}",
                dataset_root.display()
            ))
        })?;
        Ok(Self::new(path))
    }

    pub fn dump_path(&self) -> &Path {
        &self.dump_path
    }

    /// Directory the dump was extracted into; companion files (e.g.
    /// `*net_dump_ext`) live alongside the `.db_csv` here.
    pub fn dataset_root(&self) -> &Path {
        self.dump_path.parent().unwrap_or(Path::new("."))
    }

    /// First (sorted) file under the dataset root whose name ends with
    /// `suffix`, mirroring the source tool's `dataset_root.glob(...)` lookups
    /// for companion files outside the `.db_csv` itself.
    pub fn find_companion_file(&self, suffix: &str) -> Option<PathBuf> {
        let mut matches: Vec<PathBuf> = std::fs::read_dir(self.dataset_root())
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(suffix)))
            .collect();
        matches.sort();
        matches.into_iter().next()
    }

    fn index(&self) -> Result<&DumpIndex, ApiError> {
        if let Some(idx) = self.index.get() {
            return Ok(idx);
        }
        let built = build_index(&self.dump_path)?;
        Ok(self.index.get_or_init(|| built))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        match self.index() {
            Ok(idx) => idx.table_exists(name),
            Err(_) => false,
        }
    }

    /// Empty frame if absent, no error (spec.md §4.2).
    pub fn read_table(&self, name: &str) -> Frame {
        match self.index() {
            Ok(idx) if idx.table_exists(name) => {
                read_table(&self.dump_path, idx, name).unwrap_or_default()
            },
            _ => Frame::empty(),
        }
    }

    pub fn topology(&self) -> Result<&TopologyLookup, ApiError> {
        if let Some(t) = self.topology.get() {
            return Ok(t);
        }
        let idx = self.index()?;
        let built = TopologyLookup::build(&self.dump_path, idx)?;
        Ok(self.topology.get_or_init(|| built))
    }

    /// Scan the first `limit` lines of the dump for a `--<flag> <value>`
    /// argument, as `xmit`'s duration lookup does for `--pm_pause_time`
    /// (spec.md §4.4 Family A).
    pub fn scan_header_flag(&self, flag: &str, limit: usize) -> Option<f64> {
        let text = std::fs::read(&self.dump_path).ok()?;
        let text: String = text.iter().map(|&b| b as char).collect();
        for line in text.lines().take(limit) {
            if line.contains(flag) {
                return line.trim().split_whitespace().last()?.parse::<f64>().ok();
            }
        }
        None
    }
}

type Registry = DashMap<PathBuf, Arc<DatasetInventory>>;

static REGISTRY: Lazy<Registry> = Lazy::new(DashMap::new);

/// Fetch-or-insert the shared inventory for a resolved dataset directory
/// (spec.md §4.2 process-wide registry, §5 "mutex on insert/remove" —
/// `DashMap` provides the equivalent sharded locking).
pub fn acquire(dataset_root: &Path) -> Result<Arc<DatasetInventory>, ApiError> {
    let resolved = dataset_root
        .canonicalize()
        .unwrap_or_else(|_| dataset_root.to_path_buf());
    if let Some(existing) = REGISTRY.get(&resolved) {
        return Ok(existing.clone());
    }
    let inventory = Arc::new(DatasetInventory::discover(&resolved)?);
    REGISTRY.insert(resolved.clone(), inventory.clone());
    Ok(inventory)
}

/// Release a dataset's cached inventory once the orchestrator is done with
/// it (spec.md §4.2, §4.7 step 10).
pub fn release(dataset_root: &Path) {
    let resolved = dataset_root
        .canonicalize()
        .unwrap_or_else(|_| dataset_root.to_path_buf());
    REGISTRY.remove(&resolved);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_dump(dir: &Path) -> PathBuf {
        let path = dir.join("fabric.db_csv");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            concat!(
                "--pm_pause_time 2.5\n",
                "START_NODES\n",
                "NodeGUID,NodeDesc,NodeType\n",
                "0x1,\"host-a\",1\n",
                "END_NODES\n",
            )
        )
        .unwrap();
        path
    }

    #[test]
    fn discovers_and_reads() {
        let dir = tempdir().unwrap();
        write_dump(dir.path());
        let inv = DatasetInventory::discover(dir.path()).unwrap();
        assert!(inv.table_exists("NODES"));
        assert!(!inv.table_exists("LINKS"));
        let frame = inv.read_table("NODES");
        assert_eq!(frame.len(), 1);
        let missing = inv.read_table("LINKS");
        assert!(missing.is_empty());
    }

    #[test]
    fn header_flag_scan() {
        let dir = tempdir().unwrap();
        write_dump(dir.path());
        let inv = DatasetInventory::discover(dir.path()).unwrap();
        assert_eq!(inv.scan_header_flag("--pm_pause_time", 30), Some(2.5));
        assert_eq!(inv.scan_header_flag("--missing_flag", 30), None);
    }

    #[test]
    fn companion_file_lookup() {
        let dir = tempdir().unwrap();
        write_dump(dir.path());
        std::fs::write(dir.path().join("fabric.net_dump_ext"), "CA:1:1\n").unwrap();
        let inv = DatasetInventory::discover(dir.path()).unwrap();
        assert!(inv.find_companion_file("net_dump_ext").is_some());
        assert!(inv.find_companion_file("does_not_exist").is_none());
    }

    #[test]
    fn registry_roundtrip() {
        let dir = tempdir().unwrap();
        write_dump(dir.path());
        let first = acquire(dir.path()).unwrap();
        let second = acquire(dir.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        release(dir.path());
    }
}
