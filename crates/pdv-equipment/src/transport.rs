//! # Serial Transport
//!
//! The byte pipe under every scale driver: open with configured line
//! parameters, write a command, read one `\n`-terminated answer.
//!
//! ```text
//!   SerialScale ──► dyn Transport ──► SerialPortTransport ──► /dev/ttyUSB0, COM3
//!                                 └─► MockTransport (tests)
//! ```
//!
//! Drivers own their transport exclusively; nothing here is shared.

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, info};

use crate::config::SerialSettings;
use crate::error::TransportError;

/// Longest accepted answer. Anything longer is cut and handed to the parser.
pub const MAX_LINE_LEN: usize = 256;

pub trait Transport: Send {
    fn open(&mut self, settings: &SerialSettings) -> Result<(), TransportError>;

    /// Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Drops stale bytes before a new request.
    fn clear_input(&mut self) -> Result<(), TransportError>;

    fn send(&mut self, command: &[u8]) -> Result<(), TransportError>;

    /// Reads up to and excluding `\n`. Partial data before a timeout is
    /// returned as the line; a timeout with nothing read is an error.
    fn read_line(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Real serial port, 8N1, no flow control.
#[derive(Default)]
pub struct SerialPortTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::NotOpen)
    }
}

fn io_error(e: std::io::Error) -> TransportError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::Timeout,
        _ => TransportError::Io(e.to_string()),
    }
}

impl Transport for SerialPortTransport {
    fn open(&mut self, settings: &SerialSettings) -> Result<(), TransportError> {
        self.close();

        let port = serialport::new(settings.port.as_str(), settings.baudrate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.timeout)
            .open()
            .map_err(|e| TransportError::Open {
                port: settings.port.clone(),
                reason: e.to_string(),
            })?;

        info!(
            port = %settings.port,
            baudrate = settings.baudrate,
            timeout_ms = settings.timeout.as_millis() as u64,
            "Serial port opened"
        );
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(port) = self.port.take() {
            debug!(port = ?port.name(), "Serial port closed");
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.port_mut()?
            .clear(ClearBuffer::Input)
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn send(&mut self, command: &[u8]) -> Result<(), TransportError> {
        let port = self.port_mut()?;
        port.write_all(command).map_err(io_error)?;
        port.flush().map_err(io_error)
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let port = self.port_mut()?;
        let mut line = Vec::with_capacity(32);
        let mut byte = [0u8; 1];

        loop {
            match port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => {
                    line.push(byte[0]);
                    if line.len() >= MAX_LINE_LEN {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => match io_error(e) {
                    TransportError::Timeout if !line.is_empty() => break,
                    err => return Err(err),
                },
            }
        }

        if line.is_empty() {
            // a read of zero bytes means the port went quiet
            return Err(TransportError::Timeout);
        }
        Ok(line)
    }
}

// =============================================================================
// Scripted transport for driver tests
// =============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, MutexGuard};

    #[derive(Debug, Clone)]
    pub enum Reply {
        Line(&'static str),
        Timeout,
        IoError,
    }

    #[derive(Debug, Default)]
    pub struct MockState {
        pub open: bool,
        pub fail_open: bool,
        pub opened_with: Option<SerialSettings>,
        pub replies: VecDeque<Reply>,
        /// Used once the queue runs dry.
        pub fallback: Option<Reply>,
        pub sent: Vec<String>,
        pub reads: usize,
    }

    /// Cloneable handle: the test keeps one copy, the driver owns the other.
    #[derive(Debug, Clone, Default)]
    pub struct MockTransport {
        state: Arc<Mutex<MockState>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn replying(replies: impl IntoIterator<Item = Reply>) -> Self {
            let mock = Self::new();
            mock.state().replies.extend(replies);
            mock
        }

        pub fn state(&self) -> MutexGuard<'_, MockState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        pub fn push(&self, reply: Reply) {
            self.state().replies.push_back(reply);
        }

        pub fn always(&self, reply: Reply) {
            self.state().fallback = Some(reply);
        }

        pub fn sent(&self) -> Vec<String> {
            self.state().sent.clone()
        }
    }

    impl Transport for MockTransport {
        fn open(&mut self, settings: &SerialSettings) -> Result<(), TransportError> {
            let mut state = self.state();
            if state.fail_open {
                return Err(TransportError::Open {
                    port: settings.port.clone(),
                    reason: "No such file or directory".to_string(),
                });
            }
            state.open = true;
            state.opened_with = Some(settings.clone());
            Ok(())
        }

        fn close(&mut self) {
            self.state().open = false;
        }

        fn is_open(&self) -> bool {
            self.state().open
        }

        fn clear_input(&mut self) -> Result<(), TransportError> {
            if self.state().open {
                Ok(())
            } else {
                Err(TransportError::NotOpen)
            }
        }

        fn send(&mut self, command: &[u8]) -> Result<(), TransportError> {
            let mut state = self.state();
            if !state.open {
                return Err(TransportError::NotOpen);
            }
            state.sent.push(String::from_utf8_lossy(command).into_owned());
            Ok(())
        }

        fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
            let mut state = self.state();
            if !state.open {
                return Err(TransportError::NotOpen);
            }
            state.reads += 1;
            let reply = state
                .replies
                .pop_front()
                .or_else(|| state.fallback.clone())
                .unwrap_or(Reply::Timeout);
            match reply {
                Reply::Line(text) => Ok(text.trim_end_matches('\n').as_bytes().to_vec()),
                Reply::Timeout => Err(TransportError::Timeout),
                Reply::IoError => Err(TransportError::Io("device disconnected".to_string())),
            }
        }
    }
}
