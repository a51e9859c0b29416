//! Append-only trace sinks. A live session copies every byte it reads into
//! the sink so the session can be replayed later through a `TraceChannel`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{ChannelError, ChannelResult};

#[async_trait]
pub trait TraceSink: Send {
    async fn append(&mut self, bytes: &[u8]) -> ChannelResult<()>;
}

/// Appends to a file, creating it if needed.
pub struct FileTraceSink {
    path: PathBuf,
    file: File,
}

impl FileTraceSink {
    pub async fn open(path: impl AsRef<Path>) -> ChannelResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| ChannelError::Open {
                target: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TraceSink for FileTraceSink {
    async fn append(&mut self, bytes: &[u8]) -> ChannelResult<()> {
        self.file.write_all(bytes).await?;
        self.file.flush().await?;
        Ok(())
    }
}

/// In-memory sink. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryTraceSink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

#[async_trait]
impl TraceSink for MemoryTraceSink {
    async fn append(&mut self, bytes: &[u8]) -> ChannelResult<()> {
        self.buf
            .lock()
            .map_err(|_| ChannelError::Io("trace buffer poisoned".into()))?
            .extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_sink_appends_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.trace");

        let mut sink = FileTraceSink::open(&path).await.unwrap();
        sink.append(b"0100\r").await.unwrap();
        drop(sink);

        let mut sink = FileTraceSink::open(&path).await.unwrap();
        sink.append(b"41 00\r>").await.unwrap();
        assert_eq!(sink.path(), path.as_path());

        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written, b"0100\r41 00\r>");
    }

    #[tokio::test]
    async fn memory_sink_clones_share_buffer() {
        let sink = MemoryTraceSink::new();
        let mut writer = sink.clone();
        writer.append(b"AT").await.unwrap();
        writer.append(b"Z\r").await.unwrap();
        assert_eq!(sink.text(), "ATZ\r");
    }
}
