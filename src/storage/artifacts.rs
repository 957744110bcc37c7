//! Key-addressed artifact storage for raw HTML and parsed JSON.
//!
//! Keys are relative, `/`-separated paths under a bucket root:
//! `html/2024/03/2024-03-01.html`, `json/2024/03/2024-03-01.json`.
//! Artifacts are partitioned by date, so concurrent batches never write the
//! same key.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

pub trait ArtifactStore: Send + Sync {
    /// Write (or overwrite) the artifact at `key`.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    fn read(&self, key: &str) -> Result<Vec<u8>>;

    fn exists(&self, key: &str) -> bool;

    /// All keys under `prefix`, sorted. The verifier's only window into
    /// completion state.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Key for the raw page snapshot of a date.
pub fn raw_key(date: NaiveDate) -> String {
    format!("html/{}/{}.html", date.format("%Y/%m"), date)
}

/// Key for the parsed games of a date. Presence of this key is what the
/// verifier counts as "done".
pub fn parsed_key(date: NaiveDate) -> String {
    format!("json/{}/{}.json", date.format("%Y/%m"), date)
}

/// Recover the date from an artifact key, if its file stem is an ISO date.
pub fn key_date(key: &str) -> Option<NaiveDate> {
    let stem = Path::new(key).file_stem()?.to_str()?;
    stem.parse().ok()
}

// ── Filesystem implementation ─────────────────────────────────────────────────

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Could not create artifact root {:?}", root))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        fs::write(&path, bytes).with_context(|| format!("Failed to write {:?}", path))
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        fs::read(&path).with_context(|| format!("Failed to read {:?}", path))
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let base = self.path_for(prefix);
        let mut keys = Vec::new();
        if base.exists() {
            collect_files(&base, &self.root, &mut keys)?;
        }
        keys.sort();
        Ok(keys)
    }
}

fn collect_files(dir: &Path, root: &Path, keys: &mut Vec<String>) -> Result<()> {
    if dir.is_file() {
        push_key(dir, root, keys);
        return Ok(());
    }
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {:?}", dir))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, root, keys)?;
        } else {
            push_key(&path, root, keys);
        }
    }
    Ok(())
}

fn push_key(path: &Path, root: &Path, keys: &mut Vec<String>) {
    if let Ok(rel) = path.strip_prefix(root) {
        let key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        keys.push(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn temp_root(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("sched-backfill-{}-{}-{}", tag, std::process::id(), nanos))
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn key_layout_round_trips() {
        let date = d("2024-03-01");
        assert_eq!(parsed_key(date), "json/2024/03/2024-03-01.json");
        assert_eq!(raw_key(date), "html/2024/03/2024-03-01.html");
        assert_eq!(key_date(&parsed_key(date)), Some(date));
        assert_eq!(key_date("json/2024/03/checkpoint.json"), None);
    }

    #[test]
    fn write_list_read() {
        let root = temp_root("fsstore");
        let store = FsArtifactStore::new(&root).unwrap();

        store.write(&parsed_key(d("2024-03-01")), b"[]").unwrap();
        store.write(&parsed_key(d("2024-03-02")), b"[]").unwrap();
        store.write(&raw_key(d("2024-03-01")), b"<html/>").unwrap();

        let keys = store.list("json/").unwrap();
        assert_eq!(
            keys,
            vec![
                "json/2024/03/2024-03-01.json".to_string(),
                "json/2024/03/2024-03-02.json".to_string(),
            ]
        );
        assert!(store.exists(&raw_key(d("2024-03-01"))));
        assert!(!store.exists(&parsed_key(d("2024-03-03"))));
        assert_eq!(store.read(&parsed_key(d("2024-03-01"))).unwrap(), b"[]");

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn overwrite_is_idempotent() {
        let root = temp_root("fsstore-ow");
        let store = FsArtifactStore::new(&root).unwrap();
        let key = parsed_key(d("2024-03-01"));

        store.write(&key, b"first").unwrap();
        store.write(&key, b"second").unwrap();
        assert_eq!(store.read(&key).unwrap(), b"second");
        assert_eq!(store.list("json/").unwrap().len(), 1);

        std::fs::remove_dir_all(&root).ok();
    }
}
