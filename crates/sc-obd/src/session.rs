//! Transport session: drives the half-duplex command/response cycle with
//! an ELM327 over a live or recorded channel and tracks the adapter's
//! protocol state (style, headers, identity attributes).
//!
//! One command may be outstanding at a time. `send` fails while a
//! response is pending; `receive` collects bytes until the `>` prompt, a
//! per-byte idle timeout or the total receive limit (live), or the end of
//! the recording (trace). After a live timeout the next `send` first
//! drains the adapter back to its prompt.

use std::collections::BTreeMap;
use std::time::Duration;

use sc_protocol::{CanonicalRecord, FrameLayout, Headers, RawLine, RawRecord, Style};
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelKind};
use crate::elm327::{self, AtCommand, ReaderDevice};
use crate::error::{ChannelError, SessionError, SessionResult};
use crate::formatter::{self, RecordKind};
use crate::sink::TraceSink;

/// Idle time allowed between two bytes of one response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Upper bound on one whole `receive`, however chatty the adapter is.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

/// Settle time before draining residual bytes on connect.
const FLUSH_SETTLE: Duration = Duration::from_millis(100);
const FLUSH_BYTE_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Terminal outcome of one `receive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Everything up to the prompt. Empty when nothing was pending.
    Record(RawRecord),
    /// Live channel went quiet (or kept talking past the receive limit)
    /// before the prompt; partial data dropped.
    Timeout,
    /// Trace channel has no more bytes.
    EndOfTrace,
}

enum Stop {
    Prompt,
    Idle,
    EndOfData,
}

pub struct Session {
    device: ReaderDevice,
    channel: Option<Box<dyn Channel>>,
    sink: Option<Box<dyn TraceSink>>,
    state: ConnectionState,
    style: Style,
    headers: Headers,
    requested_headers: Headers,
    pending: Option<String>,
    attrs: BTreeMap<String, String>,
    timeout: Duration,
    max_wait: Duration,
    /// Set by a live timeout: the adapter may still answer the abandoned
    /// command, so its output must be drained before the next send.
    resync: bool,
    end_of_trace: bool,
}

impl Session {
    /// A disconnected session for the named reader device.
    pub fn new(device: &str) -> SessionResult<Self> {
        let device = device.parse::<ReaderDevice>()?;
        let mut session = Self {
            device,
            channel: None,
            sink: None,
            state: ConnectionState::Disconnected,
            style: Style::default(),
            headers: Headers::Off,
            requested_headers: Headers::Off,
            pending: None,
            attrs: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
            max_wait: DEFAULT_MAX_WAIT,
            resync: false,
            end_of_trace: false,
        };
        session.clear_attributes();
        Ok(session)
    }

    pub fn with_channel(mut self, channel: Box<dyn Channel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Copy every byte read from a live channel into `sink`.
    pub fn with_trace_sink(mut self, sink: Box<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Headers setting applied to the adapter on connect.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.requested_headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total time one response may take, prompt included.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    // ── Introspection ───────────────────────────────────────────

    pub fn device(&self) -> ReaderDevice {
        self.device
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn headers(&self) -> Headers {
        self.headers
    }

    pub fn layout(&self) -> FrameLayout {
        FrameLayout::new(self.style, self.headers)
    }

    /// Identity attribute by name (`"Voltage"`), `"Unknown"` until queried.
    pub fn attr(&self, name: &str) -> &str {
        self.attrs
            .get(name)
            .map(String::as_str)
            .unwrap_or(elm327::UNKNOWN_ATTRIBUTE)
    }

    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Whether a timed-out response still has to be drained.
    pub fn needs_resync(&self) -> bool {
        self.resync
    }

    fn channel_kind(&self) -> SessionResult<ChannelKind> {
        self.channel
            .as_ref()
            .map(|c| c.kind())
            .ok_or(SessionError::NoChannel)
    }

    fn require_connected(&self, operation: &'static str) -> SessionResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected { operation })
        }
    }

    fn clear_attributes(&mut self) {
        self.attrs = elm327::ATTRIBUTES
            .iter()
            .map(|(name, _)| ((*name).to_string(), elm327::UNKNOWN_ATTRIBUTE.to_string()))
            .collect();
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Open the channel. A live adapter is then flushed, reset, put into
    /// automatic protocol search, woken with 0100, switched to the requested headers
    /// setting and queried for its identity.
    pub async fn connect(&mut self) -> SessionResult<()> {
        if self.is_connected() {
            return Err(SessionError::AlreadyConnected);
        }
        let channel = self.channel.as_mut().ok_or(SessionError::NoChannel)?;

        self.state = ConnectionState::Connecting;
        info!(device = %self.device, channel = %channel.describe(), "connecting");
        if let Err(e) = channel.open().await {
            self.state = ConnectionState::Disconnected;
            warn!(error = %e, "failed to open channel");
            return Err(SessionError::Connect(e.to_string()));
        }
        let kind = channel.kind();
        self.state = ConnectionState::Connected;
        self.end_of_trace = false;
        self.pending = None;
        self.resync = false;

        if kind == ChannelKind::Live {
            if let Err(e) = self.initialize().await {
                warn!(error = %e, "adapter initialization failed");
                self.abandon().await;
                return Err(SessionError::Connect(e.to_string()));
            }
        }

        info!(
            style = ?self.style,
            headers = ?self.headers,
            protocol = %self.attr("Proto"),
            voltage = %self.attr("Voltage"),
            "connected"
        );
        Ok(())
    }

    async fn initialize(&mut self) -> SessionResult<()> {
        self.flush_residual().await?;
        self.command(elm327::RESET).await?;
        self.command(elm327::AUTO_PROTOCOL).await?;
        // Response ignored; the query only triggers the protocol search.
        self.command(elm327::PROTOCOL_SEARCH).await?;
        let headers = match self.requested_headers {
            Headers::On => elm327::HEADERS_ON,
            Headers::Off => elm327::HEADERS_OFF,
        };
        self.command(headers).await?;
        self.retrieve_attributes().await
    }

    async fn flush_residual(&mut self) -> SessionResult<()> {
        tokio::time::sleep(FLUSH_SETTLE).await;
        let channel = self.channel.as_mut().ok_or(SessionError::NoChannel)?;
        let mut drained = 0usize;
        while channel.bytes_available().await? > 0 {
            if channel.read_byte(FLUSH_BYTE_WAIT).await?.is_none() {
                break;
            }
            drained += 1;
        }
        channel.flush_input().await?;
        if drained > 0 {
            debug!(drained, "discarded residual adapter output");
        }
        Ok(())
    }

    async fn abandon(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            if let Err(e) = channel.close().await {
                warn!(error = %e, "failed to close channel");
            }
        }
        self.pending = None;
        self.resync = false;
        self.state = ConnectionState::Disconnected;
    }

    /// Reset the adapter (live only), close the channel and forget the
    /// identity attributes. A no-op when already disconnected.
    pub async fn disconnect(&mut self) -> SessionResult<()> {
        if !self.is_connected() {
            return Ok(());
        }
        self.pending = None;
        if self.channel_kind()? == ChannelKind::Live {
            if let Err(e) = self.command(elm327::RESET).await {
                warn!(error = %e, "reset on disconnect failed");
            }
        }
        self.abandon().await;
        self.clear_attributes();
        self.end_of_trace = false;
        info!(device = %self.device, "disconnected");
        Ok(())
    }

    /// Reset the adapter to its power-on defaults.
    pub async fn reset(&mut self) -> SessionResult<()> {
        self.require_connected("reset")?;
        self.command(elm327::RESET).await.map(|_| ())
    }

    /// Query every identity attribute. Style follows `ProtoNum`.
    pub async fn retrieve_attributes(&mut self) -> SessionResult<()> {
        self.require_connected("query attributes")?;
        for (_, cmd) in elm327::ATTRIBUTES {
            self.command(cmd).await?;
        }
        Ok(())
    }

    // ── Command / response cycle ────────────────────────────────

    /// Write one command. Fails if a response is still pending.
    pub async fn send(&mut self, cmd: &str) -> SessionResult<()> {
        self.require_connected("send")?;
        if let Some(pending) = &self.pending {
            return Err(SessionError::ResponsePending {
                command: pending.clone(),
            });
        }
        if self.resync {
            self.resync_prompt().await?;
        }
        let channel = self.channel.as_mut().ok_or(SessionError::NoChannel)?;
        debug!(command = cmd, "send");
        channel
            .write(format!("{cmd}{}", elm327::COMMAND_END).as_bytes())
            .await?;
        self.pending = Some(cmd.to_string());
        Ok(())
    }

    /// Read and discard adapter output up to the next prompt, then drop
    /// anything still buffered. Drained bytes never reach the trace sink.
    async fn resync_prompt(&mut self) -> SessionResult<()> {
        let (timeout, max_wait) = (self.timeout, self.max_wait);
        let channel = self.channel.as_mut().ok_or(SessionError::NoChannel)?;

        let mut drained = 0usize;
        let drain = async {
            loop {
                match channel.read_byte(timeout).await {
                    Ok(Some(elm327::PROMPT)) => return Ok(true),
                    Ok(Some(_)) => drained += 1,
                    Ok(None) => return Ok(false),
                    Err(e) => return Err::<bool, ChannelError>(e),
                }
            }
        };
        let prompt = tokio::time::timeout(max_wait, drain).await.unwrap_or(Ok(false))?;
        channel.flush_input().await?;
        self.resync = false;

        if prompt {
            debug!(drained, "late response drained, adapter back at prompt");
        } else {
            warn!(drained, "adapter did not return to its prompt after a timeout");
        }
        Ok(())
    }

    /// Read one record up to the prompt.
    ///
    /// On a live channel with nothing pending this returns an empty record
    /// without reading. A trace channel is read regardless.
    pub async fn receive(&mut self) -> SessionResult<Received> {
        self.require_connected("receive")?;
        let kind = self.channel_kind()?;
        if kind == ChannelKind::Live && self.pending.is_none() {
            return Ok(Received::Record(RawRecord::empty()));
        }
        if kind == ChannelKind::Trace && self.end_of_trace {
            self.pending = None;
            return Ok(Received::EndOfTrace);
        }

        let pending = self.pending.take();
        let (timeout, max_wait) = (self.timeout, self.max_wait);
        let channel = self.channel.as_mut().ok_or(SessionError::NoChannel)?;

        let mut raw = Vec::new();
        let mut lines: Vec<RawLine> = Vec::new();
        let mut line: Vec<String> = Vec::new();
        let mut token = String::new();

        let read = async {
            loop {
                let byte = match channel.read_byte(timeout).await {
                    Ok(Some(byte)) => byte,
                    Ok(None) if kind == ChannelKind::Live => return Ok(Stop::Idle),
                    Ok(None) => return Ok(Stop::EndOfData),
                    Err(e) => return Err::<Stop, ChannelError>(e),
                };
                raw.push(byte);
                match byte {
                    elm327::PROMPT => return Ok(Stop::Prompt),
                    b'\r' | b'\n' => {
                        end_token(&mut token, &mut line);
                        end_line(&mut line, &mut lines);
                    }
                    b if b.is_ascii_whitespace() => end_token(&mut token, &mut line),
                    b => token.push(char::from(b)),
                }
            }
        };
        let stop = match kind {
            ChannelKind::Live => match tokio::time::timeout(max_wait, read).await {
                Ok(stop) => stop?,
                Err(_) => {
                    warn!(
                        command = pending.as_deref().unwrap_or_default(),
                        max_wait_ms = max_wait.as_millis() as u64,
                        "response exceeded the receive limit"
                    );
                    Stop::Idle
                }
            },
            ChannelKind::Trace => read.await?,
        };
        end_token(&mut token, &mut line);
        end_line(&mut line, &mut lines);

        if kind == ChannelKind::Live && !raw.is_empty() {
            let bytes = match stop {
                Stop::Idle => closed_echo(&raw),
                _ => raw,
            };
            if let Some(sink) = self.sink.as_mut() {
                if let Err(e) = sink.append(&bytes).await {
                    warn!(error = %e, "failed to append to trace sink");
                }
            }
        }

        let record = RawRecord::new(lines);
        match stop {
            Stop::Prompt => {
                check_echo(pending.as_deref(), &record);
                Ok(Received::Record(record))
            }
            Stop::Idle => {
                self.resync = true;
                warn!(
                    command = pending.as_deref().unwrap_or_default(),
                    timeout_ms = timeout.as_millis() as u64,
                    partial_lines = record.len(),
                    "timed out waiting for prompt"
                );
                Ok(Received::Timeout)
            }
            Stop::EndOfData => {
                self.end_of_trace = true;
                if record.is_empty() {
                    Ok(Received::EndOfTrace)
                } else {
                    Ok(Received::Record(record))
                }
            }
        }
    }

    /// Send a command and return its raw record, applying any adapter
    /// status it carries. A timeout yields an empty record.
    pub async fn command(&mut self, cmd: &str) -> SessionResult<RawRecord> {
        self.send(cmd).await?;
        match self.receive().await? {
            Received::Record(record) => {
                if formatter::classify(&record) == RecordKind::AdapterStatus {
                    self.absorb_adapter_status(&record);
                }
                Ok(record)
            }
            Received::Timeout | Received::EndOfTrace => Ok(RawRecord::empty()),
        }
    }

    /// Send an OBD-II request and reassemble the response.
    ///
    /// No data, timeouts and non-application records all yield an empty
    /// record. A structurally malformed response is a `Format` error; the
    /// session stays usable.
    pub async fn issue(&mut self, mode_pid: &str) -> SessionResult<CanonicalRecord> {
        self.send(mode_pid).await?;
        let record = match self.receive().await? {
            Received::Record(record) => self.triage(record)?,
            Received::Timeout | Received::EndOfTrace => None,
        };
        Ok(record.unwrap_or_else(|| CanonicalRecord::no_data(mode_pid)))
    }

    /// Next application record from a recording. `AT` records update the
    /// session state on the way. `None` at the end of the trace.
    pub async fn next_record(&mut self) -> SessionResult<Option<CanonicalRecord>> {
        self.require_connected("read trace")?;
        if self.channel_kind()? == ChannelKind::Live && self.pending.is_none() {
            return Ok(None);
        }
        loop {
            match self.receive().await? {
                Received::Record(record) => {
                    if let Some(canonical) = self.triage(record)? {
                        return Ok(Some(canonical));
                    }
                }
                Received::Timeout | Received::EndOfTrace => return Ok(None),
            }
        }
    }

    fn triage(&mut self, record: RawRecord) -> SessionResult<Option<CanonicalRecord>> {
        match formatter::classify(&record) {
            RecordKind::Noise => Ok(None),
            RecordKind::AdapterStatus => {
                self.absorb_adapter_status(&record);
                Ok(None)
            }
            RecordKind::Application => {
                let clean = elm327::scrub_status_lines(&record);
                let layout = self.layout();
                match formatter::reassemble(&clean, layout) {
                    Ok(canonical) => {
                        debug!(command = %canonical.command, ecus = canonical.responses.len(), ?layout, "record");
                        Ok(Some(canonical))
                    }
                    Err(e) => {
                        warn!(error = %e, ?layout, "malformed record discarded");
                        Err(e.into())
                    }
                }
            }
        }
    }

    fn absorb_adapter_status(&mut self, record: &RawRecord) {
        let Some(echo) = record.echo() else {
            return;
        };
        let text = elm327::response_text(record);
        let rejected = text == "?";
        match AtCommand::parse(echo) {
            AtCommand::Reset => self.headers = Headers::Off,
            AtCommand::HeadersOn if !rejected => self.headers = Headers::On,
            AtCommand::HeadersOff if !rejected => self.headers = Headers::Off,
            AtCommand::Attribute(name) => {
                let value = if text.is_empty() {
                    elm327::UNKNOWN_ATTRIBUTE.to_string()
                } else {
                    text
                };
                if name == "ProtoNum" {
                    match Style::from_protocol_number(&value) {
                        Some(style) => self.style = style,
                        None => debug!(value = %value, "protocol number not recognized, style unchanged"),
                    }
                }
                self.attrs.insert(name.to_string(), value);
            }
            _ => {}
        }
    }
}

fn end_token(token: &mut String, line: &mut Vec<String>) {
    if !token.is_empty() {
        line.push(std::mem::take(token));
    }
}

fn end_line(line: &mut Vec<String>, lines: &mut Vec<RawLine>) {
    if !line.is_empty() {
        lines.push(RawLine::new(std::mem::take(line)));
    }
}

/// Trace bytes for a timed-out response: the echo line only, closed with
/// a prompt, so a replay yields the same empty record the live call did.
fn closed_echo(raw: &[u8]) -> Vec<u8> {
    let echo_end = raw.iter().position(|b| *b == b'\r' || *b == b'\n').unwrap_or(raw.len());
    let mut bytes = raw[..echo_end].to_vec();
    bytes.extend_from_slice(b"\r\r");
    bytes.push(elm327::PROMPT);
    bytes
}

fn check_echo(sent: Option<&str>, record: &RawRecord) {
    let Some(sent) = sent else {
        return;
    };
    let expected: String = sent.split_whitespace().collect::<String>().to_uppercase();
    let echoed = record.echo().map(RawLine::compact).unwrap_or_default();
    if echoed != expected {
        warn!(sent = %sent, echoed = %echoed, "echo does not match command");
    }
}
