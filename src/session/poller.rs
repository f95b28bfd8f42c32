// State-driven poller and periodic PA temperature poll
// Both issue queries through the shared command lock and never fail the session

use super::error::RadioError;
use super::events::RadioEvent;
use super::radio::{pa_temperature, rssi_dbm, settled, Shared};
use crate::ccdi::{QueryResponse, QueryType};
use crate::core::{is_plausible_temperature, RadioState};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Poll RSSI while receiving and VSWR while transmitting, idle in configuration mode
pub(crate) async fn run_poller(shared: Arc<Shared>) {
    let mut shutdown = shared.shutdown.subscribe();
    debug!("Poller started");

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let pause = if shared.is_config_mode() {
            shared.config.config_mode_idle
        } else {
            match shared.radio_state() {
                RadioState::ReceivingNoise | RadioState::ReceivingSignal => {
                    poll_rssi(&shared).await;
                    shared.config.rssi_poll_interval
                }
                RadioState::Transmitting => {
                    poll_vswr(&shared).await;
                    shared.config.vswr_poll_interval
                }
            }
        };

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(pause) => {}
        }
    }

    debug!("Poller stopped");
}

/// Query raw RSSI once and publish it
pub(crate) async fn poll_rssi(shared: &Shared) {
    match shared.query(QueryType::RawRssi).await {
        Ok(Some(response)) => match rssi_dbm(&response) {
            Some(dbm) => {
                trace!(dbm, "RSSI");
                shared.emit(RadioEvent::RssiUpdated { dbm });
            }
            None => warn!(data = %response.data, "Unreadable RSSI value"),
        },
        Ok(None) => debug!("Timed out waiting for RSSI"),
        Err(e) => log_poll_error("RSSI", &e),
    }
}

/// Query forward and reverse power and publish VSWR once the transmitter has settled
pub(crate) async fn poll_vswr(shared: &Shared) {
    let sampled_at = Instant::now();
    let started = shared.state.borrow().transmit_started();

    let Some(forward) = read_value(shared, QueryType::ForwardPower).await else {
        return;
    };
    let Some(reverse) = read_value(shared, QueryType::ReversePower).await else {
        return;
    };

    // A different burst (or none) means the pair no longer belongs together
    if shared.state.borrow().transmit_started() != started {
        trace!("Transmit state changed while reading power, discarding");
        return;
    }
    if !settled(started, sampled_at, shared.config.transmit_settle_time) {
        trace!(forward, reverse, "Transmitter not settled, discarding power readings");
        return;
    }

    match shared.config.vswr_formula.vswr(forward, reverse) {
        Some(vswr) => {
            debug!(forward, reverse, vswr, "VSWR");
            shared.emit(RadioEvent::VswrChanged { vswr });
        }
        None => debug!(forward, reverse, "Discarding unusable VSWR"),
    }
}

async fn read_value(shared: &Shared, query: QueryType) -> Option<f64> {
    match shared.query(query).await {
        Ok(Some(response)) => {
            let value = response.value();
            if value.is_none() {
                warn!(?query, data = %response.data, "Unreadable value");
            }
            value
        }
        Ok(None) => {
            debug!(?query, "Timed out waiting for response");
            None
        }
        Err(e) => {
            log_poll_error("power", &e);
            None
        }
    }
}

fn log_poll_error(what: &str, error: &RadioError) {
    match error {
        RadioError::Disconnected | RadioError::ConnectionLost(_) => {
            trace!(what, error = %error, "Poll skipped, session stopping")
        }
        e if e.is_recoverable() => debug!(what, error = %e, "Poll failed"),
        e => warn!(what, error = %e, "Poll failed"),
    }
}

/// Query PA temperature every `temperature_period`, skipped in configuration mode
pub(crate) async fn run_temperature_timer(shared: Arc<Shared>) {
    let mut shutdown = shared.shutdown.subscribe();
    let mut interval = tokio::time::interval(shared.config.temperature_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = interval.tick() => {}
        }

        if *shutdown.borrow_and_update() {
            break;
        }
        if shared.is_config_mode() {
            trace!("Skipping PA temperature poll in configuration mode");
            continue;
        }

        poll_temperature(&shared).await;
    }

    debug!("Temperature timer stopped");
}

/// Query PA temperature once and publish a plausible reading
///
/// No response is normal while the radio is busy and is not reported.
pub(crate) async fn poll_temperature(shared: &Shared) {
    let samples = shared
        .query_samples(
            QueryType::PaTemperature,
            2,
            shared.config.temperature_timeout,
        )
        .await;

    let samples: Vec<QueryResponse> = match samples {
        Ok(samples) => samples,
        Err(e) => {
            log_poll_error("PA temperature", &e);
            return;
        }
    };

    let Some(reading) = pa_temperature(&samples) else {
        debug!("No PA temperature response");
        return;
    };

    if !is_plausible_temperature(reading.celsius) {
        warn!(celsius = reading.celsius, "Ignoring implausible PA temperature");
        return;
    }

    info!(celsius = reading.celsius, adc = ?reading.adc_millivolts, "PA temperature");
    shared.emit(RadioEvent::PaTemperature(reading));
}
