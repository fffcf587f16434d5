//! Persisting fit records.
//!
//! Writes go to a sibling temporary file which is then renamed into place, so a
//! crash mid-write never leaves a truncated record behind.

use nf_core::{Error, FitResult, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Serialise `value` as pretty JSON to `path` atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Validation(format!("not a file path: {}", path.display())))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    {
        let mut f = fs::File::create(&tmp)?;
        serde_json::to_writer_pretty(&mut f, value)?;
        f.write_all(b"\n")?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a JSON file written by [`write_json_atomic`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = fs::File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(f))?)
}

/// Keyed storage of fit records, e.g. `data_3/h1_fit_to_h0_fid_7`.
pub trait FitSink {
    /// Whether a record exists under `key`.
    fn contains(&self, key: &str) -> bool;

    /// Load the record stored under `key`.
    fn load(&self, key: &str) -> Result<FitResult>;

    /// Store `fit` under `key`, replacing any previous record.
    fn store(&mut self, key: &str, fit: &FitResult) -> Result<()>;
}

/// One JSON file per key below a root directory.
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    root: PathBuf,
}

impl JsonDirSink {
    /// Sink rooted at `root` (created on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl FitSink for JsonDirSink {
    fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    fn load(&self, key: &str) -> Result<FitResult> {
        read_json(&self.path_for(key))
    }

    fn store(&mut self, key: &str, fit: &FitResult) -> Result<()> {
        write_json_atomic(&self.path_for(key), fit)
    }
}

/// Sink that keeps nothing; every fit runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl FitSink for NullSink {
    fn contains(&self, _key: &str) -> bool {
        false
    }

    fn load(&self, key: &str) -> Result<FitResult> {
        Err(Error::Validation(format!("no record '{key}' in a null sink")))
    }

    fn store(&mut self, _key: &str, _fit: &FitResult) -> Result<()> {
        Ok(())
    }
}
