// Byte transport to the radio
// The session engine only needs ordered bytes, a read timeout and line writes

use super::comm::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Physical link to a radio
///
/// The listener task owns the transport exclusively and selects between
/// reading and writing, so `read_byte` must be cancel safe: dropping the
/// future at an await point must not lose a byte.
#[async_trait]
pub trait Transport: Send {
    /// Open the underlying device
    async fn open(&mut self) -> Result<()>;

    /// Close the underlying device
    async fn close(&mut self) -> Result<()>;

    /// Read a single byte
    ///
    /// Returns `Ok(None)` if nothing arrived within `timeout`. A `None`
    /// timeout waits indefinitely.
    async fn read_byte(&mut self, timeout: Option<Duration>) -> Result<Option<u8>>;

    /// Write text exactly as given; the caller adds any terminator
    async fn write(&mut self, text: &str) -> Result<()>;

    /// Drop anything pending in the input and output buffers
    async fn discard_buffers(&mut self) -> Result<()>;

    /// Name for logging, e.g. the device path
    fn name(&self) -> &str;
}
