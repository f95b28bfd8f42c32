//! CCDI radio monitor
//! Connects to a Tait radio and prints state changes, RSSI with noise floor and SNR, VSWR and PA temperature

use std::collections::VecDeque;
use std::env;
use std::time::Duration;
use tait_ccdi::core::RadioState;
use tait_ccdi::serial::{SerialConfig, SerialPort};
use tait_ccdi::session::{RadioError, RadioEvent, SessionConfig, TaitRadio};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt::format::FmtSpan, prelude::*, EnvFilter};

/// Delay before reopening the port after a failure
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// RSSI samples kept for the noise floor estimate
const NOISE_FLOOR_SAMPLES: usize = 100;

struct Args {
    port: String,
    baud_rate: u32,
    config: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <port> [baud] [--config session.json]", args[0]);
        eprintln!("Example: {} /dev/ttyUSB0 28800", args[0]);
        std::process::exit(1);
    }

    let mut port = None;
    let mut baud_rate = None;
    let mut config = None;

    let mut rest = args[1..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--config" => {
                let path = rest
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config needs a file name"))?;
                config = Some(path.clone());
            }
            value if port.is_none() => port = Some(value.to_string()),
            value if baud_rate.is_none() => {
                baud_rate = Some(
                    value
                        .parse()
                        .map_err(|_| anyhow::anyhow!("Invalid baud rate: {}", value))?,
                );
            }
            value => anyhow::bail!("Unexpected argument: {}", value),
        }
    }

    Ok(Args {
        port: port.ok_or_else(|| anyhow::anyhow!("No port given"))?,
        baud_rate: baud_rate.unwrap_or(SerialConfig::default().baud_rate),
        config,
    })
}

/// Rolling median of RSSI while the channel is idle
#[derive(Debug, Default)]
struct NoiseFloor {
    samples: VecDeque<f64>,
}

impl NoiseFloor {
    fn add(&mut self, dbm: f64) {
        self.samples.push_back(dbm);
        if self.samples.len() > NOISE_FLOOR_SAMPLES {
            self.samples.pop_front();
        }
    }

    fn median(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }
}

/// Print events until the session ends
async fn monitor(radio: &TaitRadio) -> Result<(), RadioError> {
    let mut events = radio.subscribe();
    let mut noise_floor = NoiseFloor::default();
    let mut last = tokio::time::Instant::now();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} events", skipped);
                continue;
            }
            Err(RecvError::Closed) => return radio.closed().await,
        };

        let elapsed = last.elapsed().as_millis();
        last = tokio::time::Instant::now();

        match event {
            RadioEvent::StateChanged { from, to } => {
                println!("Radio state transition {} --> {}", from, to);
            }
            RadioEvent::RssiUpdated { dbm } => match radio.state() {
                RadioState::ReceivingSignal => match noise_floor.median() {
                    Some(floor) => println!(
                        "{:03}ms   rssi:{:.1}dBm   nf:{:.1}dBm   snr:{:.1}dB",
                        elapsed,
                        dbm,
                        floor,
                        dbm - floor
                    ),
                    None => println!("{:03}ms   rssi:{:.1}dBm", elapsed, dbm),
                },
                // Measure the noise floor while idle
                _ => noise_floor.add(dbm),
            },
            RadioEvent::VswrChanged { vswr } => {
                println!("{:03}ms   vswr:{:.1}:1", elapsed, vswr);
            }
            RadioEvent::PaTemperature(reading) => match reading.adc_millivolts {
                Some(adc) => println!("PA temperature {:.1}C ({}mV)", reading.celsius, adc),
                None => println!("PA temperature {:.1}C", reading.celsius),
            },
            RadioEvent::ModeChanged { mode } => println!("Radio mode {:?}", mode),
            RadioEvent::ErrorReported(error) => println!("Radio error: {}", error),
            RadioEvent::ModelIdentified { model } => println!("Radio model {}", model),
            RadioEvent::Progress(_) => {}
            RadioEvent::ConnectionLost { reason } => {
                return Err(RadioError::ConnectionLost(reason));
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let format_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(format_layer)
        .init();

    let args = parse_args()?;
    let session_config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    tracing::info!("CCDI Radio Monitor");
    tracing::info!("Port: {} at {} baud", args.port, args.baud_rate);
    tracing::info!("VSWR formula: {:?}", session_config.vswr_formula);

    loop {
        let port = SerialPort::new(&args.port, SerialConfig::new(args.baud_rate));

        let radio = tokio::select! {
            connected = TaitRadio::connect(Box::new(port), session_config.clone()) => connected,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };

        let radio = match radio {
            Ok(radio) => radio,
            Err(e) => {
                tracing::error!("Failed to connect: {}", e);
                tracing::info!("Retrying in {}s", RECONNECT_DELAY.as_secs());
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        if let Some(model) = radio.model() {
            println!("Connected to {}", model);
        }

        let outcome = tokio::select! {
            outcome = monitor(&radio) => outcome,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                radio.disconnect().await?;
                return Ok(());
            }
        };

        if let Err(e) = outcome {
            tracing::error!("Session ended: {}", e);
        }
        if let Err(e) = radio.disconnect().await {
            tracing::debug!("Disconnect after failure: {}", e);
        }

        tracing::info!("Reconnecting in {}s", RECONNECT_DELAY.as_secs());
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
