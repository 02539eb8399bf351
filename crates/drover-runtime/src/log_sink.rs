use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only log file for one task.
///
/// Single writer (the flow driving the task), any number of concurrent
/// readers through `read_since`/`read_to_string`. Every append is flushed so
/// a read taken while the task is still running is always a strict prefix of
/// a later read.
pub struct LogSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl LogSink {
    pub async fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, chunk: &[u8]) -> std::io::Result<()> {
        let mut file = self.file.lock().await;
        file.write_all(chunk).await?;
        file.flush().await
    }

    /// Current byte length of the log.
    pub async fn offset(&self) -> std::io::Result<u64> {
        let meta = tokio::fs::metadata(&self.path).await?;
        Ok(meta.len())
    }

    /// Read everything appended at or after `offset`. Offsets past the end
    /// of the file yield an empty string.
    pub async fn read_since(&self, offset: u64) -> std::io::Result<String> {
        let bytes = tokio::fs::read(&self.path).await?;
        let start = (offset as usize).min(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[start..]).to_string())
    }

    pub async fn read_to_string(&self) -> std::io::Result<String> {
        self.read_since(0).await
    }
}
