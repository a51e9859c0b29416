//! Mock adapter channel for testing.
//!
//! Emulates an ELM327: every command written (terminated by CR) is echoed,
//! followed by its scripted response and the `>` prompt. Clones share state,
//! so a test can keep a handle after moving the channel into a session and
//! inspect what was written.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::channel::{Channel, ChannelKind};
use crate::elm327::PROMPT;
use crate::error::{ChannelError, ChannelResult};

/// Pace of the endless output of a babbling command.
const BABBLE_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Default)]
struct MockState {
    /// Command → response text (`None` = never answers).
    responses: HashMap<String, Option<String>>,
    /// Used instead of `responses` while headers are on.
    header_responses: HashMap<String, String>,
    /// Commands answered with output that never reaches a prompt.
    babble: HashSet<String>,
    babbling: bool,
    rx: VecDeque<u8>,
    partial: Vec<u8>,
    written: Vec<String>,
    headers: bool,
    open: bool,
    fail_open: bool,
}

/// Scripted ELM327 with write recording.
#[derive(Clone)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

fn key(cmd: &str) -> String {
    cmd.split_whitespace().collect::<String>().to_uppercase()
}

impl MockChannel {
    /// A mock that answers `?` to everything.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// A CAN 11-bit vehicle behind an ELM327 v1.5, with a handful of PIDs.
    pub fn elm327() -> Self {
        Self::new()
            .respond("ATZ", "ELM327 v1.5")
            .respond("ATSP0", "OK")
            .respond("ATH1", "OK")
            .respond("ATH0", "OK")
            .respond("AT@1", "OBDII to RS232 Interpreter")
            .respond("AT@2", "?")
            .respond("ATI", "ELM327 v1.5")
            .respond("ATDP", "AUTO, ISO 15765-4 (CAN 11/500)")
            .respond("ATDPN", "A6")
            .respond("ATRV", "12.6V")
            .respond("0100", "SEARCHING...\n41 00 BE 3E A8 11")
            .respond_with_headers("0100", "7E8 06 41 00 BE 3E A8 11")
            .respond("0120", "41 20 80 00 00 00")
            .respond_with_headers("0120", "7E8 06 41 20 80 00 00 00")
            .respond("0101", "41 01 81 07 65 04")
            .respond_with_headers("0101", "7E8 06 41 01 81 07 65 04")
            .respond("010C", "41 0C 1A F8")
            .respond_with_headers("010C", "7E8 04 41 0C 1A F8 AA AA AA")
            .respond("010D", "41 0D 3C")
            .respond_with_headers("010D", "7E8 03 41 0D 3C AA AA AA AA")
            .respond_with_headers("011C", "7E8 03 41 1C 01 AA AA AA AA")
            .respond_with_headers("0151", "7E8 03 41 51 01 AA AA AA AA")
            .respond_with_headers(
                "0902",
                "7E8 10 14 49 02 01 31 47 31\n7E8 21 4A 43 35 34 34 34 52\n7E8 22 37 32 35 32 33 36 37",
            )
            .respond_with_headers("0904", "7E8 10 13 49 04 01 4A 4D 42\n7E8 21 2A 33 36 37 36 31 35\n7E8 22 30 30 00 00 00 00 AA")
            .respond_with_headers("03", "7E8 06 43 02 01 33 03 00 AA")
    }

    /// Script the response to `cmd`. Lines are separated by `\n`.
    pub fn respond(self, cmd: &str, response: &str) -> Self {
        self.lock().responses.insert(key(cmd), Some(response.to_string()));
        self
    }

    /// Script the response to `cmd` while `ATH1` is in effect.
    pub fn respond_with_headers(self, cmd: &str, response: &str) -> Self {
        self.lock().header_responses.insert(key(cmd), response.to_string());
        self
    }

    /// `cmd` is echoed but never completed with a prompt.
    pub fn silence(self, cmd: &str) -> Self {
        self.lock().responses.insert(key(cmd), None);
        self
    }

    pub fn failing_open(self) -> Self {
        self.lock().fail_open = true;
        self
    }

    /// `cmd` is echoed, then followed by output that never ends in a
    /// prompt. Stops on `flush_input`.
    pub fn babble(self, cmd: &str) -> Self {
        self.lock().babble.insert(key(cmd));
        self
    }

    /// Bytes waiting to be read before any command is written.
    pub fn queue_raw(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes.iter().copied());
    }

    /// Every complete command written so far.
    pub fn written(&self) -> Vec<String> {
        self.lock().written.clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    fn answer(&mut self, cmd: String) {
        let k = key(&cmd);
        match k.as_str() {
            "ATH1" => self.headers = true,
            "ATH0" | "ATZ" => self.headers = false,
            _ => {}
        }

        let with_headers = if self.headers {
            self.header_responses.get(&k).cloned().map(Some)
        } else {
            None
        };
        let body = with_headers
            .or_else(|| self.responses.get(&k).cloned())
            .unwrap_or_else(|| Some("?".to_string()));

        self.rx.extend(cmd.as_bytes());
        self.rx.push_back(b'\r');
        if self.babble.contains(&k) {
            self.babbling = true;
            self.written.push(cmd);
            return;
        }
        if let Some(body) = body {
            for line in body.split('\n') {
                self.rx.extend(line.as_bytes());
                self.rx.push_back(b'\r');
            }
            self.rx.push_back(b'\r');
            self.rx.push_back(PROMPT);
        }
        self.written.push(cmd);
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Live
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }

    async fn open(&mut self) -> ChannelResult<()> {
        let mut state = self.lock();
        if state.fail_open {
            return Err(ChannelError::Open {
                target: "mock".into(),
                message: "scripted failure".into(),
            });
        }
        state.open = true;
        Ok(())
    }

    async fn close(&mut self) -> ChannelResult<()> {
        self.lock().open = false;
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> ChannelResult<()> {
        let mut state = self.lock();
        if !state.open {
            return Err(ChannelError::Closed);
        }
        for &b in bytes {
            match b {
                b'\r' => {
                    let cmd = String::from_utf8_lossy(&state.partial).trim().to_string();
                    state.partial.clear();
                    if !cmd.is_empty() {
                        state.answer(cmd);
                    }
                }
                b'\n' => {}
                other => state.partial.push(other),
            }
        }
        Ok(())
    }

    async fn read_byte(&mut self, _timeout: Duration) -> ChannelResult<Option<u8>> {
        let babbling = {
            let mut state = self.lock();
            if !state.open {
                return Err(ChannelError::Closed);
            }
            if let Some(byte) = state.rx.pop_front() {
                return Ok(Some(byte));
            }
            state.babbling
        };
        if !babbling {
            return Ok(None);
        }
        tokio::time::sleep(BABBLE_INTERVAL).await;
        Ok(Some(b'.'))
    }

    async fn bytes_available(&mut self) -> ChannelResult<usize> {
        Ok(self.lock().rx.len())
    }

    async fn flush_input(&mut self) -> ChannelResult<()> {
        let mut state = self.lock();
        state.rx.clear();
        state.babbling = false;
        Ok(())
    }
}
