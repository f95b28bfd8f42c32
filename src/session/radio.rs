// Radio session: public API over the listener, poller and temperature tasks
// All writes go through the listener task, which owns the transport

use super::config::SessionConfig;
use super::error::{RadioError, RadioResult};
use super::events::{PaTemperature, RadioEvent};
use super::listener::{self, Greeting, WriteRequest};
use super::poller;
use super::slots::ResponseSlots;
use crate::ccdi::commands::{self, Bandwidth, Direction, PowerLevel};
use crate::ccdi::frame::TERMINATOR;
use crate::ccdi::{
    Acknowledgement, CcdiFrame, ProgressMessage, ProgressType, QueryResponse, QueryType, RadioMode,
};
use crate::core::{calculate_degrees, is_plausible_temperature, RadioState, StateMachine};
use crate::serial::Transport;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// State shared between the public handle and the background tasks
pub(crate) struct Shared {
    pub(crate) config: SessionConfig,
    writes: mpsc::Sender<WriteRequest>,
    /// Serializes "write command, wait for its response" across tasks
    pub(crate) command_lock: tokio::sync::Mutex<()>,
    /// Set by the listener on `.`, cleared by every gated write
    pub(crate) ready: watch::Sender<bool>,
    pub(crate) config_mode: watch::Sender<bool>,
    pub(crate) state: watch::Sender<StateMachine>,
    pub(crate) slots: ResponseSlots,
    events: broadcast::Sender<RadioEvent>,
    pub(crate) shutdown: watch::Sender<bool>,
    failure: Mutex<Option<String>>,
    model: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn new(
        config: SessionConfig,
        writes: mpsc::Sender<WriteRequest>,
        greeting: Greeting,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        let slots = ResponseSlots::new(config.max_queued_responses);
        Self {
            config,
            writes,
            command_lock: tokio::sync::Mutex::new(()),
            ready: watch::Sender::new(true),
            config_mode: watch::Sender::new(greeting.mode == RadioMode::Configuration),
            state: watch::Sender::new(StateMachine::new()),
            slots,
            events,
            shutdown: watch::Sender::new(false),
            failure: Mutex::new(None),
            model: Mutex::new(greeting.model),
        }
    }

    pub(crate) fn emit(&self, event: RadioEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.events.subscribe()
    }

    pub(crate) fn is_config_mode(&self) -> bool {
        *self.config_mode.borrow()
    }

    /// Record the radio's mode, announcing it if it changed
    pub(crate) fn set_config_mode(&self, enabled: bool) {
        let changed = self.config_mode.send_if_modified(|current| {
            let changed = *current != enabled;
            *current = enabled;
            changed
        });

        if !enabled {
            // The radio does not send `.` in configuration mode
            self.ready.send_replace(true);
        }

        if changed {
            let mode = if enabled {
                RadioMode::Configuration
            } else {
                RadioMode::Normal
            };
            info!(?mode, "Radio mode changed");
            self.emit(RadioEvent::ModeChanged { mode });
        }
    }

    pub(crate) fn radio_state(&self) -> RadioState {
        self.state.borrow().state()
    }

    /// Feed a progress message to the state machine and publish it
    pub(crate) fn apply_progress(&self, progress: ProgressMessage) {
        let mut transition = None;
        self.state.send_if_modified(|machine| {
            transition = machine.apply(progress.progress_type);
            transition.is_some()
        });

        if let Some(transition) = transition {
            info!(from = %transition.from, to = %transition.to, "Radio state changed");
            self.emit(RadioEvent::StateChanged {
                from: transition.from,
                to: transition.to,
            });
        }
        self.emit(RadioEvent::Progress(progress));
    }

    pub(crate) fn model(&self) -> Option<String> {
        lock(&self.model).clone()
    }

    pub(crate) fn set_model(&self, model: String) {
        *lock(&self.model) = Some(model.clone());
        self.emit(RadioEvent::ModelIdentified { model });
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stop the session because the transport failed
    pub(crate) fn fail(&self, reason: String) {
        {
            let mut failure = lock(&self.failure);
            if failure.is_none() {
                *failure = Some(reason.clone());
            }
        }
        self.shutdown.send_replace(true);
        self.emit(RadioEvent::ConnectionLost { reason });
    }

    pub(crate) fn failure(&self) -> Option<String> {
        lock(&self.failure).clone()
    }

    /// Resolves once shutdown has been requested
    pub(crate) async fn shut_down(&self) {
        let mut shutdown = self.shutdown.subscribe();
        // The sender lives in `self`, so this only returns once the flag is set
        let _ = shutdown.wait_for(|stopped| *stopped).await;
    }

    /// Hand a line to the listener task and wait for it to be written
    async fn write_line(&self, line: String) -> RadioResult<()> {
        if self.is_shutdown() {
            return Err(self.stopped_error());
        }

        let (done, written) = oneshot::channel();
        self.writes
            .send(WriteRequest { line, done })
            .await
            .map_err(|_| self.stopped_error())?;
        written.await.map_err(|_| self.stopped_error())??;
        Ok(())
    }

    fn stopped_error(&self) -> RadioError {
        match self.failure() {
            Some(reason) => RadioError::ConnectionLost(reason),
            None => RadioError::Disconnected,
        }
    }

    /// Wait for the ready byte and claim it
    ///
    /// Caller must hold `command_lock`. Bypassed in configuration mode.
    async fn wait_ready(&self) -> RadioResult<()> {
        if self.is_config_mode() {
            return Ok(());
        }

        let mut ready = self.ready.subscribe();
        let became_ready = tokio::select! {
            result = tokio::time::timeout(
                self.config.ready_timeout,
                async { ready.wait_for(|ready| *ready).await.map(|_| ()) },
            ) => result,
            _ = self.shut_down() => return Err(self.stopped_error()),
        };

        match became_ready {
            Ok(Ok(())) => {
                self.ready.send_replace(false);
                Ok(())
            }
            Ok(Err(_)) => Err(self.stopped_error()),
            Err(_) => Err(RadioError::Timeout("radio ready signal".to_string())),
        }
    }

    /// Write a command once the radio is ready. Caller must hold `command_lock`.
    pub(crate) async fn send_locked(&self, command: &str) -> RadioResult<()> {
        self.wait_ready().await?;
        debug!(command, "Sending command");
        let mut line = command.to_string();
        line.push(TERMINATOR as char);
        self.write_line(line).await
    }

    /// Send a command without waiting for any response
    pub(crate) async fn send(&self, command: &str) -> RadioResult<()> {
        let _guard = self.command_lock.lock().await;
        self.send_locked(command).await
    }

    /// Send a CCTM query and wait for its `j` response
    ///
    /// `Ok(None)` means the radio did not answer within `response_timeout`.
    pub(crate) async fn query(&self, query: QueryType) -> RadioResult<Option<QueryResponse>> {
        let code = response_code_of(query)?;
        let _guard = self.command_lock.lock().await;
        self.send_locked(query.command()).await?;
        Ok(self.slots.wait_query(code, self.config.response_timeout).await)
    }

    /// Send a CCTM query that may be answered by several `j` frames
    ///
    /// Stale responses for the same code are dropped first.
    pub(crate) async fn query_samples(
        &self,
        query: QueryType,
        count: usize,
        timeout: Duration,
    ) -> RadioResult<Vec<QueryResponse>> {
        let code = response_code_of(query)?;
        let _guard = self.command_lock.lock().await;
        self.slots.clear(code);
        self.send_locked(query.command()).await?;
        Ok(self.slots.wait_queries(code, count, timeout).await)
    }

    /// Send a configuration-mode command and wait for `+` or `-`
    pub(crate) async fn configure(&self, frame: CcdiFrame) -> RadioResult<()> {
        let _guard = self.command_lock.lock().await;
        self.slots.clear_acks();
        self.send_locked(&frame.to_string()).await?;

        match self.slots.wait_ack(self.config.response_timeout).await {
            Some(Acknowledgement::Accepted { .. }) => Ok(()),
            Some(Acknowledgement::Rejected(code)) => {
                warn!(command = %frame, %code, "Radio rejected command");
                Err(RadioError::Protocol(code))
            }
            None => Err(RadioError::Timeout(format!("acknowledgement of {}", frame))),
        }
    }

    /// Switch modes and wait for the radio to confirm with a mode report or acknowledgement
    pub(crate) async fn change_mode(&self, mode: RadioMode) -> RadioResult<()> {
        let enabled = mode == RadioMode::Configuration;
        let frame = commands::set_mode(mode)?;

        let _guard = self.command_lock.lock().await;
        self.slots.clear_acks();
        let mut reported = self.config_mode.subscribe();
        self.send_locked(&frame.to_string()).await?;

        tokio::select! {
            changed = reported.wait_for(|current| *current == enabled) => {
                changed.map(|_| ()).map_err(|_| self.stopped_error())
            }
            ack = self.slots.wait_ack(self.config.response_timeout) => match ack {
                Some(Acknowledgement::Accepted { .. }) => {
                    self.set_config_mode(enabled);
                    Ok(())
                }
                Some(Acknowledgement::Rejected(code)) => Err(RadioError::Protocol(code)),
                None => Err(RadioError::Timeout(format!("switch to {:?} mode", mode))),
            },
        }
    }
}

fn response_code_of(query: QueryType) -> RadioResult<&'static str> {
    query
        .response_code()
        .ok_or_else(|| RadioError::Usage(format!("{:?} is not answered with a j frame", query)))
}

/// Convert a raw RSSI response (tenths of a dBm) to dBm
pub(crate) fn rssi_dbm(response: &QueryResponse) -> Option<f64> {
    response.value().map(|tenths| tenths / 10.0)
}

/// Turn the one or two PA temperature responses into a reading
///
/// Two responses carry degrees C then the ADC value; a single response is
/// the ADC value alone.
pub(crate) fn pa_temperature(samples: &[QueryResponse]) -> Option<PaTemperature> {
    let values: Vec<f64> = samples.iter().filter_map(QueryResponse::value).collect();
    match values.as_slice() {
        [celsius, adc, ..] => Some(PaTemperature {
            celsius: *celsius,
            adc_millivolts: Some(*adc),
        }),
        [adc] => Some(PaTemperature {
            celsius: calculate_degrees(*adc),
            adc_millivolts: Some(*adc),
        }),
        [] => None,
    }
}

/// Connection to a Tait radio speaking CCDI
///
/// Dropping the handle stops the background tasks; [`TaitRadio::disconnect`]
/// additionally waits for them and closes the transport.
pub struct TaitRadio {
    shared: Arc<Shared>,
    listener: Option<JoinHandle<Box<dyn Transport>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl TaitRadio {
    /// Open the transport, wait for the radio to answer and start the session
    ///
    /// The handshake is retried until the radio responds, so wrap this in
    /// a timeout if the radio may never appear.
    pub async fn connect(
        mut transport: Box<dyn Transport>,
        config: SessionConfig,
    ) -> RadioResult<Self> {
        config
            .validate()
            .map_err(|e| RadioError::Usage(e.to_string()))?;

        info!(port = transport.name(), "Connecting to radio");
        transport.open().await?;
        let greeting = listener::handshake(transport.as_mut(), &config).await?;

        let (writes_tx, writes_rx) = mpsc::channel(16);
        let shared = Arc::new(Shared::new(config, writes_tx, greeting));

        let listener = tokio::spawn(listener::run(transport, shared.clone(), writes_rx));
        let tasks = vec![
            tokio::spawn(poller::run_poller(shared.clone())),
            tokio::spawn(poller::run_temperature_timer(shared.clone())),
        ];

        Ok(Self {
            shared,
            listener: Some(listener),
            tasks,
        })
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.shared.subscribe()
    }

    pub fn state(&self) -> RadioState {
        self.shared.radio_state()
    }

    /// Time spent in the current transmit burst
    pub fn time_transmitting(&self) -> Option<Duration> {
        self.shared.state.borrow().time_transmitting()
    }

    pub fn is_config_mode(&self) -> bool {
        self.shared.is_config_mode()
    }

    /// Model and CCDI version reported by the radio, if it has identified itself
    pub fn model(&self) -> Option<String> {
        self.shared.model()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Send a query without waiting for its response
    ///
    /// Responses are handled like any other frame from the radio.
    pub async fn trigger_query(&self, query: QueryType) -> RadioResult<()> {
        self.shared.send(query.command()).await
    }

    /// Raw RSSI in dBm
    pub async fn read_raw_rssi(&self) -> RadioResult<Option<f64>> {
        let response = self.read(QueryType::RawRssi).await?;
        Ok(response.as_ref().and_then(rssi_dbm))
    }

    /// Averaged RSSI in dBm
    pub async fn read_averaged_rssi(&self) -> RadioResult<Option<f64>> {
        let response = self.read(QueryType::AveragedRssi).await?;
        Ok(response.as_ref().and_then(rssi_dbm))
    }

    /// Forward power in ADC units
    pub async fn read_forward_power(&self) -> RadioResult<Option<f64>> {
        let response = self.read(QueryType::ForwardPower).await?;
        Ok(response.as_ref().and_then(QueryResponse::value))
    }

    /// Reverse power in ADC units
    pub async fn read_reverse_power(&self) -> RadioResult<Option<f64>> {
        let response = self.read(QueryType::ReversePower).await?;
        Ok(response.as_ref().and_then(QueryResponse::value))
    }

    /// VSWR from a fresh forward/reverse pair, using the configured formula
    ///
    /// Meaningful only while transmitting; the settling window is not applied.
    pub async fn read_vswr(&self) -> RadioResult<Option<f64>> {
        let Some(forward) = self.read_forward_power().await? else {
            return Ok(None);
        };
        let Some(reverse) = self.read_reverse_power().await? else {
            return Ok(None);
        };
        Ok(self.shared.config.vswr_formula.vswr(forward, reverse))
    }

    pub async fn read_pa_temperature(&self) -> RadioResult<Option<PaTemperature>> {
        let samples = self
            .shared
            .query_samples(
                QueryType::PaTemperature,
                2,
                self.shared.config.temperature_timeout,
            )
            .await;
        match samples {
            Ok(samples) => Ok(pa_temperature(&samples).filter(|reading| {
                let plausible = is_plausible_temperature(reading.celsius);
                if !plausible {
                    warn!(celsius = reading.celsius, "Ignoring implausible PA temperature");
                }
                plausible
            })),
            Err(RadioError::Timeout(what)) => {
                debug!(%what, "PA temperature read timed out");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn read(&self, query: QueryType) -> RadioResult<Option<QueryResponse>> {
        match self.shared.query(query).await {
            Ok(None) => {
                debug!(?query, "No response from radio");
                Ok(None)
            }
            Err(RadioError::Timeout(what)) => {
                debug!(?query, %what, "Query timed out");
                Ok(None)
            }
            other => other,
        }
    }

    pub async fn enter_config_mode(&self) -> RadioResult<()> {
        if self.is_config_mode() {
            return Ok(());
        }
        self.shared.change_mode(RadioMode::Configuration).await
    }

    pub async fn exit_config_mode(&self) -> RadioResult<()> {
        if !self.is_config_mode() {
            return Ok(());
        }
        self.shared.change_mode(RadioMode::Normal).await
    }

    fn require_config_mode(&self) -> RadioResult<()> {
        if self.is_config_mode() {
            Ok(())
        } else {
            Err(RadioError::NotInConfigMode)
        }
    }

    /// Set the receive or transmit frequency in Hz
    pub async fn set_frequency(&self, direction: Direction, hz: u64) -> RadioResult<()> {
        self.require_config_mode()?;
        self.shared
            .configure(commands::set_frequency(direction, hz)?)
            .await
    }

    /// Set or clear (`None`) the receive or transmit CTCSS tone
    pub async fn set_ctcss(&self, direction: Direction, tone_hz: Option<f64>) -> RadioResult<()> {
        self.require_config_mode()?;
        self.shared
            .configure(commands::set_ctcss(direction, tone_hz)?)
            .await
    }

    pub async fn set_volume(&self, level: u8) -> RadioResult<()> {
        self.require_config_mode()?;
        self.shared.configure(commands::set_volume(level)?).await
    }

    pub async fn set_bandwidth(&self, bandwidth: Bandwidth) -> RadioResult<()> {
        self.require_config_mode()?;
        self.shared
            .configure(commands::set_bandwidth(bandwidth)?)
            .await
    }

    pub async fn set_power(&self, power: PowerLevel) -> RadioResult<()> {
        self.require_config_mode()?;
        self.shared.configure(commands::set_power(power)?).await
    }

    pub async fn set_monitor(&self, enabled: bool) -> RadioResult<()> {
        self.require_config_mode()?;
        self.shared.configure(commands::set_monitor(enabled)?).await
    }

    /// Change channel, optionally within a zone
    pub async fn go_to_channel(&self, channel: u16, zone: Option<&str>) -> RadioResult<()> {
        let frame = commands::go_to_channel(channel, zone)?;
        self.shared.send(&frame.to_string()).await
    }

    /// Send a generic function command
    pub async fn function(
        &self,
        function: u8,
        subfunction: Option<u8>,
        qualifier: Option<&str>,
    ) -> RadioResult<()> {
        let frame = commands::function(function, subfunction, qualifier)?;
        self.shared.send(&frame.to_string()).await
    }

    /// Ask which channel the radio is on
    ///
    /// The radio answers with a channel change progress message; `Ok(None)`
    /// if none arrives within `response_timeout`.
    pub async fn get_current_channel(&self) -> RadioResult<Option<ProgressMessage>> {
        let frame = commands::get_current_channel()?;
        let mut events = self.subscribe();
        self.shared.send(&frame.to_string()).await?;

        let deadline = tokio::time::Instant::now() + self.shared.config.response_timeout;
        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(RadioEvent::Progress(progress)))
                    if progress.progress_type == ProgressType::UserInitiatedChannelChange =>
                {
                    return Ok(Some(progress));
                }
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    debug!(skipped, "Event receiver lagged waiting for channel report");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(self.shared.stopped_error())
                }
                Err(_) => return Ok(None),
            }
        }
    }

    /// Resolves when the session stops
    ///
    /// Returns `Err(ConnectionLost)` if the transport failed, `Ok` after a
    /// requested shutdown.
    pub async fn closed(&self) -> RadioResult<()> {
        self.shared.shut_down().await;
        match self.shared.failure() {
            Some(reason) => Err(RadioError::ConnectionLost(reason)),
            None => Ok(()),
        }
    }

    /// Stop all tasks and close the transport
    pub async fn disconnect(mut self) -> RadioResult<()> {
        info!("Disconnecting from radio");
        self.shared.shutdown.send_replace(true);

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Session task ended abnormally");
            }
        }

        if let Some(listener) = self.listener.take() {
            let mut transport = listener
                .await
                .map_err(|e| RadioError::Internal(format!("listener task failed: {}", e)))?;
            transport.close().await?;
        }

        match self.shared.failure() {
            Some(reason) => Err(RadioError::ConnectionLost(reason)),
            None => Ok(()),
        }
    }
}

impl Drop for TaitRadio {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
    }
}

/// Whether a reading taken at `sampled_at` is past the settling window
pub(crate) fn settled(started: Option<Instant>, sampled_at: Instant, settle: Duration) -> bool {
    started.is_some_and(|started| sampled_at.saturating_duration_since(started) >= settle)
}
