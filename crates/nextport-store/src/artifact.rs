//! Output of finished runs: the consolidated export or patch file.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::info;

use crate::StoreError;

/// Destination for finished artifacts.
pub trait ArtifactSink: Send + Sync {
    /// Deliver `bytes` under `file_name`. Returns where it ended up.
    fn deliver(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError>;
}

/// Writes artifacts into an output directory, creating it on first use.
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArtifactSink for DirSink {
    fn deliver(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
            return Err(StoreError::Other(format!(
                "artifact name {file_name:?} is not a plain file name"
            )));
        }
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self.dir.join(file_name);
        fs::write(&path, bytes).map_err(|e| StoreError::io(&path, e))?;
        info!(path = %path.display(), bytes = bytes.len(), "artifact written");
        Ok(path)
    }
}

/// Keeps delivered artifacts in memory.
#[derive(Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(file_name, bytes)` for every delivery, in order.
    pub fn delivered(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ArtifactSink for MemorySink {
    fn deliver(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((file_name.to_string(), bytes.to_vec()));
        Ok(PathBuf::from(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_sink_creates_directory_and_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirSink::new(tmp.path().join("out"));
        let path = sink.deliver("export.json", b"{}").unwrap();
        assert_eq!(path, tmp.path().join("out/export.json"));
        assert_eq!(fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn dir_sink_rejects_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirSink::new(tmp.path());
        assert!(sink.deliver("../escape.json", b"{}").is_err());
        assert!(sink.deliver("", b"{}").is_err());
    }

    #[test]
    fn memory_sink_records_deliveries() {
        let sink = MemorySink::new();
        sink.deliver("a.json", b"1").unwrap();
        sink.deliver("b.json", b"2").unwrap();
        let names: Vec<String> = sink.delivered().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }
}
