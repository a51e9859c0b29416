//! Byte channel abstraction.
//!
//! `Channel` trait with `write`/`read_byte`. Implementations:
//! - `SerialChannel`: live adapter on a serial port (`tokio-serial`)
//! - `TraceChannel`: replays a recorded session from a file or buffer
//! - `MockChannel`: scripted adapter for tests (in `mock.rs`)

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits};

use crate::error::{ChannelError, ChannelResult};

/// Default ELM327 baud rate.
pub const DEFAULT_BAUD: u32 = 38400;

/// Whether a channel talks to hardware or replays a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Live,
    Trace,
}

/// A half-duplex byte channel to the adapter.
#[async_trait]
pub trait Channel: Send {
    fn kind(&self) -> ChannelKind;

    /// Port path or trace name, for logs.
    fn describe(&self) -> String;

    async fn open(&mut self) -> ChannelResult<()>;

    async fn close(&mut self) -> ChannelResult<()>;

    async fn write(&mut self, bytes: &[u8]) -> ChannelResult<()>;

    /// Next byte, or `None` on timeout (live) or end of data (trace).
    async fn read_byte(&mut self, timeout: Duration) -> ChannelResult<Option<u8>>;

    /// Bytes already buffered on the receive side.
    async fn bytes_available(&mut self) -> ChannelResult<usize>;

    /// Discard anything buffered on the receive side.
    async fn flush_input(&mut self) -> ChannelResult<()>;
}

// ── Serial port ─────────────────────────────────────────────────

/// Live adapter on a serial port, 8N1 without flow control.
pub struct SerialChannel {
    path: String,
    baud: u32,
    port: Option<SerialStream>,
}

impl SerialChannel {
    pub fn new(path: impl Into<String>, baud: u32) -> Self {
        Self {
            path: path.into(),
            baud,
            port: None,
        }
    }

    fn port(&mut self) -> ChannelResult<&mut SerialStream> {
        self.port.as_mut().ok_or(ChannelError::Closed)
    }
}

#[async_trait]
impl Channel for SerialChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Live
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path, self.baud)
    }

    async fn open(&mut self) -> ChannelResult<()> {
        let port = tokio_serial::new(&self.path, self.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| ChannelError::Open {
                target: self.path.clone(),
                message: e.to_string(),
            })?;
        self.port = Some(port);
        Ok(())
    }

    async fn close(&mut self) -> ChannelResult<()> {
        self.port = None;
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> ChannelResult<()> {
        let port = self.port()?;
        port.write_all(bytes).await?;
        port.flush().await?;
        Ok(())
    }

    async fn read_byte(&mut self, timeout: Duration) -> ChannelResult<Option<u8>> {
        let port = self.port()?;
        match tokio::time::timeout(timeout, port.read_u8()).await {
            Ok(Ok(byte)) => Ok(Some(byte)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }

    async fn bytes_available(&mut self) -> ChannelResult<usize> {
        let port = self.port()?;
        let n = port.bytes_to_read().map_err(|e| ChannelError::Io(e.to_string()))?;
        Ok(n as usize)
    }

    async fn flush_input(&mut self) -> ChannelResult<()> {
        let port = self.port()?;
        port.clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| ChannelError::Io(e.to_string()))
    }
}

// ── Trace replay ────────────────────────────────────────────────

/// Replays bytes captured from a live session. Writes are discarded.
pub struct TraceChannel {
    source: Option<PathBuf>,
    data: Vec<u8>,
    pos: usize,
    open: bool,
}

impl TraceChannel {
    /// Trace loaded from `path` when the channel is opened.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(path.into()),
            data: Vec::new(),
            pos: 0,
            open: false,
        }
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            source: None,
            data: data.into(),
            pos: 0,
            open: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }
}

#[async_trait]
impl Channel for TraceChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Trace
    }

    fn describe(&self) -> String {
        match &self.source {
            Some(path) => path.display().to_string(),
            None => "<memory>".to_string(),
        }
    }

    async fn open(&mut self) -> ChannelResult<()> {
        if let Some(path) = &self.source {
            self.data = tokio::fs::read(path).await.map_err(|e| ChannelError::Open {
                target: path.display().to_string(),
                message: e.to_string(),
            })?;
        }
        self.pos = 0;
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> ChannelResult<()> {
        self.open = false;
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> ChannelResult<()> {
        if !self.open {
            return Err(ChannelError::Closed);
        }
        tracing::trace!(len = bytes.len(), "write to trace channel discarded");
        Ok(())
    }

    async fn read_byte(&mut self, _timeout: Duration) -> ChannelResult<Option<u8>> {
        if !self.open {
            return Err(ChannelError::Closed);
        }
        let byte = self.data.get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        Ok(byte)
    }

    async fn bytes_available(&mut self) -> ChannelResult<usize> {
        Ok(self.remaining())
    }

    async fn flush_input(&mut self) -> ChannelResult<()> {
        Ok(())
    }
}
