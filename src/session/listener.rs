// Listener task: owns the transport, assembles frames byte by byte and dispatches them
// Also hosts the boot handshake, which reads frames the same way before the task starts

use super::config::SessionConfig;
use super::error::RadioResult;
use super::events::RadioEvent;
use super::radio::Shared;
use crate::ccdi::frame::{parse_hex, TERMINATOR};
use crate::ccdi::{
    commands, ident, is_frame_starter, Acknowledgement, CcdiError, CcdiFrame, CcdiResult,
    ErrorMessage, ModeReport, ProgressMessage, QueryResponse, QueryType, RadioMode, READY,
};
use crate::serial::{self, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// A line for the listener to write, with a completion signal
pub(crate) struct WriteRequest {
    pub line: String,
    pub done: oneshot::Sender<serial::comm::Result<()>>,
}

/// What the boot handshake learned about the radio
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Greeting {
    pub model: Option<String>,
    pub mode: RadioMode,
}

/// Outcome of feeding one byte to a [`FrameAssembler`]
#[derive(Debug, PartialEq)]
pub(crate) enum Assembled {
    /// The radio's ready byte
    Ready,
    /// Byte consumed, nothing complete yet
    Pending,
    Frame(CcdiFrame),
    /// Frame discarded
    Rejected(CcdiError),
    /// Byte outside any frame that is not a known frame starter
    Unexpected(u8),
}

/// Incremental frame reader
///
/// After a frame starter it expects 2 length digits, that many parameter
/// characters, 2 checksum digits and a CR, all printable ASCII.
#[derive(Debug, Default)]
pub(crate) struct FrameAssembler {
    text: String,
    /// Characters expected before the terminator, known once the length arrives
    expected: Option<usize>,
    started: Option<Instant>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the frame in progress started, `None` between frames
    pub fn started(&self) -> Option<Instant> {
        self.started
    }

    pub fn reset(&mut self) {
        self.text.clear();
        self.expected = None;
        self.started = None;
    }

    fn take(&mut self) -> String {
        let text = std::mem::take(&mut self.text);
        self.reset();
        text
    }

    pub fn feed(&mut self, byte: u8) -> Assembled {
        if self.started.is_none() {
            return match byte {
                READY => Assembled::Ready,
                b if is_frame_starter(b) => {
                    self.text.push(b as char);
                    self.started = Some(Instant::now());
                    Assembled::Pending
                }
                // Line endings between frames carry nothing
                b'\r' | b'\n' => Assembled::Pending,
                other => Assembled::Unexpected(other),
            };
        }

        if self.expected == Some(self.text.len()) {
            let text = self.take();
            if byte != TERMINATOR {
                return Assembled::Rejected(CcdiError::MissingTerminator(text));
            }
            return match decode(&text) {
                Ok(frame) => Assembled::Frame(frame),
                Err(e) => Assembled::Rejected(e),
            };
        }

        if !(32..=126).contains(&byte) {
            let text = self.take();
            let error = if byte == TERMINATOR {
                CcdiError::FrameTooShort(text.len())
            } else {
                CcdiError::InvalidCharacter(format!("{}\\x{:02X}", text, byte))
            };
            return Assembled::Rejected(error);
        }

        self.text.push(byte as char);
        if self.text.len() == 3 {
            match parse_hex(&self.text[1..3]) {
                Ok(size) => self.expected = Some(3 + size + 2),
                Err(e) => {
                    self.reset();
                    return Assembled::Rejected(e);
                }
            }
        }
        Assembled::Pending
    }
}

/// Parse a complete frame and verify its checksum
pub(crate) fn decode(text: &str) -> CcdiResult<CcdiFrame> {
    let frame = CcdiFrame::parse(text)?;
    if !frame.is_valid() {
        return Err(CcdiError::InvalidChecksum(text.to_string()));
    }
    Ok(frame)
}

/// Read until a frame accepted by `wanted` arrives or `timeout` elapses
///
/// Other frames and ready bytes are skipped.
pub(crate) async fn read_frame(
    transport: &mut dyn Transport,
    timeout: Duration,
    wanted: impl Fn(&CcdiFrame) -> bool,
) -> RadioResult<Option<CcdiFrame>> {
    let deadline = Instant::now() + timeout;
    let mut assembler = FrameAssembler::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }

        let Some(byte) = transport.read_byte(Some(remaining)).await? else {
            return Ok(None);
        };

        match assembler.feed(byte) {
            Assembled::Frame(frame) if wanted(&frame) => return Ok(Some(frame)),
            Assembled::Frame(frame) => trace!(%frame, "Skipping frame during handshake"),
            Assembled::Rejected(e) => debug!(error = %e, "Discarding frame during handshake"),
            Assembled::Ready | Assembled::Pending | Assembled::Unexpected(_) => {}
        }
    }
}

/// Wait for the radio to identify itself
///
/// Sends the model query, then a mode ping in case the radio is sitting in
/// configuration mode. Repeats until one of them is answered.
pub(crate) async fn handshake(
    transport: &mut dyn Transport,
    config: &SessionConfig,
) -> RadioResult<Greeting> {
    let model_query = format!("{}\r", QueryType::ModelAndCcdiVersion.command());
    let mode_ping = commands::mode_ping()?.to_wire();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        transport.discard_buffers().await?;

        transport.write(&model_query).await?;
        let model = read_frame(transport, config.handshake_timeout, |frame| {
            frame.ident() == ident::MODEL
        })
        .await?;
        if let Some(frame) = model {
            let model = frame.params().to_string();
            info!(%model, attempt, "Radio identified");
            return Ok(Greeting {
                model: Some(model),
                mode: RadioMode::Normal,
            });
        }

        transport.write(&mode_ping).await?;
        let report = read_frame(transport, config.handshake_timeout, |frame| {
            frame.ident() == ident::MODE_REPORT || frame.ident() == ident::ACK
        })
        .await?;
        let in_config_mode = match report {
            Some(frame) if frame.ident() == ident::ACK => true,
            Some(frame) => matches!(
                ModeReport::try_from(&frame),
                Ok(ModeReport {
                    mode: RadioMode::Configuration
                })
            ),
            None => false,
        };
        if in_config_mode {
            info!(attempt, "Radio answered mode ping, in configuration mode");
            return Ok(Greeting {
                model: None,
                mode: RadioMode::Configuration,
            });
        }

        if attempt == 1 || attempt % 10 == 0 {
            info!(attempt, port = transport.name(), "Looking for radio...");
        } else {
            debug!(attempt, "No response from radio");
        }
    }
}

/// Listener task
///
/// Runs until shutdown or a transport failure and hands the transport back
/// so it can be closed.
pub(crate) async fn run(
    mut transport: Box<dyn Transport>,
    shared: Arc<Shared>,
    mut writes: mpsc::Receiver<WriteRequest>,
) -> Box<dyn Transport> {
    let mut shutdown = shared.shutdown.subscribe();
    let mut assembler = FrameAssembler::new();
    debug!(port = transport.name(), "Listener started");

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let timeout = read_timeout(&shared, &assembler);

        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }

            request = writes.recv() => {
                let Some(WriteRequest { line, done }) = request else {
                    break;
                };
                match transport.write(&line).await {
                    Ok(()) => {
                        let _ = done.send(Ok(()));
                    }
                    Err(e) => {
                        error!(error = %e, "Write to radio failed");
                        shared.fail(e.to_string());
                        let _ = done.send(Err(e));
                        break;
                    }
                }
            }

            read = transport.read_byte(timeout) => match read {
                Ok(Some(byte)) => handle_byte(&shared, &mut assembler, byte),
                Ok(None) => {
                    if assembler.started().is_some() {
                        warn!("Timed out reading frame, discarding");
                        assembler.reset();
                    } else {
                        trace!("No data read");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Read from radio failed");
                    shared.fail(e.to_string());
                    break;
                }
            },
        }
    }

    debug!("Listener stopped");
    transport
}

/// Read timeout for the next byte
///
/// Mid-frame, whatever is left of the frame budget. Between frames, the
/// listener timeout, or none in configuration mode.
fn read_timeout(shared: &Shared, assembler: &FrameAssembler) -> Option<Duration> {
    match assembler.started() {
        Some(started) => Some(
            shared
                .config
                .frame_timeout
                .saturating_sub(started.elapsed()),
        ),
        None if shared.is_config_mode() => None,
        None => Some(shared.config.listener_read_timeout),
    }
}

pub(crate) fn handle_byte(shared: &Shared, assembler: &mut FrameAssembler, byte: u8) {
    match assembler.feed(byte) {
        Assembled::Ready => {
            trace!("Radio ready");
            shared.ready.send_replace(true);
        }
        Assembled::Pending => {}
        Assembled::Frame(frame) => dispatch(shared, frame),
        Assembled::Rejected(e) => warn!(error = %e, "Discarding frame"),
        Assembled::Unexpected(byte) => {
            warn!(byte = %format!("0x{:02X}", byte), "Unexpected byte from radio")
        }
    }
}

/// Route a verified frame by identifier
pub(crate) fn dispatch(shared: &Shared, frame: CcdiFrame) {
    debug!(%frame, "Received frame");

    match frame.ident() {
        ident::QUERY_RESPONSE => match QueryResponse::try_from(&frame) {
            Ok(response) => shared.slots.push_query(response),
            Err(e) => warn!(error = %e, "Bad query response"),
        },
        ident::PROGRESS => match ProgressMessage::try_from(&frame) {
            Ok(progress) => {
                debug!(%progress, "Progress message");
                shared.apply_progress(progress);
            }
            Err(e) => warn!(error = %e, "Bad progress message"),
        },
        ident::ERROR => match ErrorMessage::try_from(&frame) {
            Ok(error) => {
                warn!(%error, "Radio reported an error");
                shared.emit(RadioEvent::ErrorReported(error));
            }
            Err(e) => warn!(error = %e, "Bad error message"),
        },
        ident::MODEL => {
            let model = frame.params().to_string();
            info!(%model, "Radio model");
            shared.set_model(model);
        }
        ident::MODE_REPORT => match ModeReport::try_from(&frame) {
            Ok(report) => shared.set_config_mode(report.mode == RadioMode::Configuration),
            Err(e) => warn!(error = %e, "Bad mode report"),
        },
        ident::ACK | ident::NACK => match Acknowledgement::try_from(&frame) {
            Ok(ack) => {
                match ack {
                    Acknowledgement::Rejected(code) if !code.is_known() => {
                        warn!(%code, "Unrecognised negative acknowledgement")
                    }
                    Acknowledgement::Rejected(code) => debug!(%code, "Command rejected"),
                    Acknowledgement::Accepted { command } => {
                        debug!(?command, "Command acknowledged")
                    }
                }
                shared.slots.push_ack(ack);
            }
            Err(e) => warn!(error = %e, "Bad acknowledgement"),
        },
        other => warn!(ident = %other, "Unhandled frame"),
    }
}
