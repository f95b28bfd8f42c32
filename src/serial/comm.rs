// Serial port transport
// Wraps the serialport crate; blocking reads use a short port timeout and yield to tokio between polls

use super::transport::Transport;
use async_trait::async_trait;
use std::io::{self, Read, Write};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SerialError {
    #[error("Serial port error: {0}")]
    Port(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Port not open")]
    NotOpen,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SerialError>;

/// Serial port configuration
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate; Tait mobiles ship at 28800
    pub baud_rate: u32,

    /// Data bits (5, 6, 7, 8)
    pub data_bits: serialport::DataBits,

    /// Stop bits
    pub stop_bits: serialport::StopBits,

    /// Parity
    pub parity: serialport::Parity,

    /// Flow control
    pub flow_control: serialport::FlowControl,

    /// How long one blocking read may hold the thread before yielding
    pub poll_interval: Duration,

    /// Write timeout
    pub write_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 28800,
            data_bits: serialport::DataBits::Eight,
            stop_bits: serialport::StopBits::One,
            parity: serialport::Parity::None,
            flow_control: serialport::FlowControl::None,
            poll_interval: Duration::from_millis(10),
            write_timeout: Duration::from_secs(2),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with specified baud rate
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the blocking read poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set hardware flow control (RTS/CTS)
    pub fn with_hardware_flow(mut self) -> Self {
        self.flow_control = serialport::FlowControl::Hardware;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(SerialError::InvalidConfig("baud rate must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(SerialError::InvalidConfig(
                "poll interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Serial port connected to the radio's CCDI interface
pub struct SerialPort {
    port: Option<Box<dyn serialport::SerialPort>>,
    config: SerialConfig,
    port_name: String,
}

impl SerialPort {
    /// Create an unopened port; call [`Transport::open`] before use
    pub fn new(port_name: &str, config: SerialConfig) -> Self {
        Self {
            port: None,
            config,
            port_name: port_name.to_string(),
        }
    }

    /// Get the port name
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Get the configuration
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Whether the port is currently open
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port.as_mut().ok_or(SerialError::NotOpen)
    }
}

#[async_trait]
impl Transport for SerialPort {
    async fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        self.config.validate()?;

        let mut port = serialport::new(&self.port_name, self.config.baud_rate)
            .data_bits(self.config.data_bits)
            .stop_bits(self.config.stop_bits)
            .parity(self.config.parity)
            .flow_control(self.config.flow_control)
            .timeout(self.config.poll_interval)
            .open()
            .map_err(|e| SerialError::Port(format!("{}: {}", self.port_name, e)))?;

        // Most programming cables need DTR/RTS asserted to power the level shifter
        let _ = port.write_data_terminal_ready(true);
        let _ = port.write_request_to_send(true);

        info!(port = %self.port_name, baud = self.config.baud_rate, "opened serial port");
        self.port = Some(port);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            info!(port = %self.port_name, "closed serial port");
        }
        Ok(())
    }

    async fn read_byte(&mut self, timeout: Option<Duration>) -> Result<Option<u8>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let port = self.port_mut()?;
        let mut byte = [0u8; 1];

        loop {
            match port.read(&mut byte) {
                Ok(1) => return Ok(Some(byte[0])),
                Ok(_) => {
                    return Err(SerialError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Port closed",
                    )))
                }
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => return Err(SerialError::Io(e)),
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(None);
            }
            // Only await point; no byte has been consumed here
            tokio::task::yield_now().await;
        }
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        let write_timeout = self.config.write_timeout;
        let port = self.port_mut()?;

        tokio::time::timeout(write_timeout, async {
            port.write_all(text.as_bytes())?;
            port.flush()
        })
        .await
        .map_err(|_| SerialError::Timeout(write_timeout))?
        .map_err(SerialError::Io)?;

        debug!(text = text.trim_end(), "wrote to radio");
        Ok(())
    }

    async fn discard_buffers(&mut self) -> Result<()> {
        let port = self.port_mut()?;
        port.clear(serialport::ClearBuffer::All)
            .map_err(|e| SerialError::Port(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.port_name
    }
}
