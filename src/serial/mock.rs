// Mock transport for testing without hardware
// Behaves like a radio on the other end of the cable: scripted replies per command

use super::comm::{Result, SerialError};
use super::transport::Transport;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
struct MockState {
    /// Data to be read (simulates radio output)
    read_buffer: VecDeque<u8>,

    /// Lines that were written, terminator removed
    written: Vec<String>,

    /// Replies queued whenever the matching command is written
    responses: HashMap<String, Vec<u8>>,

    open: bool,
    fail_open: bool,
    fail_reads: bool,
}

/// Mock transport for testing
///
/// Clones share the same buffers, so a test can keep one handle while the
/// session owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    data_ready: Arc<Notify>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Push data to be read (simulates the radio sending data)
    pub fn push_read_data(&self, data: &[u8]) {
        self.lock().read_buffer.extend(data.iter().copied());
        self.data_ready.notify_waiters();
    }

    /// Reply with `response` every time `command` is written
    ///
    /// Replaces any earlier reply scripted for the same command.
    pub fn respond_to(&self, command: &str, response: &[u8]) {
        self.lock()
            .responses
            .insert(command.to_string(), response.to_vec());
    }

    /// Lines written so far, without terminators
    pub fn written_lines(&self) -> Vec<String> {
        self.lock().written.clone()
    }

    /// Check if a specific command was written
    pub fn was_written(&self, command: &str) -> bool {
        self.count_written(command) > 0
    }

    /// Number of times a command was written
    pub fn count_written(&self, command: &str) -> usize {
        self.lock()
            .written
            .iter()
            .filter(|line| line.as_str() == command)
            .count()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        self.lock().written.clear();
    }

    /// Get number of bytes waiting to be read
    pub fn bytes_available(&self) -> usize {
        self.lock().read_buffer.len()
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Make the next `open` fail, as if the device were missing
    pub fn set_fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    /// Make every read fail, as if the cable were pulled
    pub fn fail_reads(&self) {
        self.lock().fail_reads = true;
        self.data_ready.notify_waiters();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> Result<()> {
        let mut state = self.lock();
        if state.fail_open {
            return Err(SerialError::Port("mock device missing".into()));
        }
        state.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.lock().open = false;
        self.data_ready.notify_waiters();
        Ok(())
    }

    async fn read_byte(&mut self, timeout: Option<Duration>) -> Result<Option<u8>> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let notified = self.data_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if !state.open {
                    return Err(SerialError::NotOpen);
                }
                if state.fail_reads {
                    return Err(SerialError::Io(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "mock cable unplugged",
                    )));
                }
                if let Some(byte) = state.read_buffer.pop_front() {
                    return Ok(Some(byte));
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        {
            let mut state = self.lock();
            if !state.open {
                return Err(SerialError::NotOpen);
            }

            let line = text.trim_end_matches(['\r', '\n']).to_string();
            if let Some(reply) = state.responses.get(&line).cloned() {
                state.read_buffer.extend(reply);
            }
            state.written.push(line);
        }
        self.data_ready.notify_waiters();
        Ok(())
    }

    async fn discard_buffers(&mut self) -> Result<()> {
        self.lock().read_buffer.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_basic() {
        let mut port = MockTransport::new();
        port.open().await.unwrap();

        port.push_read_data(b".p");
        assert_eq!(port.read_byte(None).await.unwrap(), Some(b'.'));
        assert_eq!(port.read_byte(None).await.unwrap(), Some(b'p'));

        port.write("q010FE\r").await.unwrap();
        assert_eq!(port.written_lines(), vec!["q010FE".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_timeout() {
        let mut port = MockTransport::new();
        port.open().await.unwrap();

        let result = port.read_byte(Some(Duration::from_millis(20))).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_mock_scripted_response() {
        let mut port = MockTransport::new();
        port.open().await.unwrap();
        port.respond_to("q010FE", b".m");

        port.write("q011FD\r").await.unwrap();
        assert_eq!(port.bytes_available(), 0);

        port.write("q010FE\r").await.unwrap();
        assert_eq!(port.bytes_available(), 2);

        port.respond_to("q010FE", b".");
        port.write("q010FE\r").await.unwrap();
        assert_eq!(port.bytes_available(), 3);
        assert!(port.was_written("q010FE"));
        assert_eq!(port.count_written("q011FD"), 1);
    }

    #[tokio::test]
    async fn test_mock_wakes_blocked_reader() {
        let mut port = MockTransport::new();
        port.open().await.unwrap();
        let feeder = port.clone();

        let reader = tokio::spawn(async move { port.read_byte(None).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        feeder.push_read_data(b"j");

        assert_eq!(reader.await.unwrap().unwrap(), Some(b'j'));
    }

    #[tokio::test]
    async fn test_mock_closed_and_failing() {
        let mut port = MockTransport::new();
        assert!(matches!(port.write("x").await, Err(SerialError::NotOpen)));

        port.set_fail_open(true);
        assert!(port.open().await.is_err());

        port.set_fail_open(false);
        port.open().await.unwrap();
        port.fail_reads();
        assert!(matches!(
            port.read_byte(None).await,
            Err(SerialError::Io(_))
        ));
    }
}
