// Notifications published by a radio session
// Delivered over a tokio broadcast channel; slow subscribers may miss events

use crate::ccdi::{ErrorMessage, ProgressMessage, RadioMode};
use crate::core::RadioState;

/// A PA temperature reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaTemperature {
    pub celsius: f64,
    /// Raw ADC value in millivolts, when the radio reported one
    pub adc_millivolts: Option<f64>,
}

/// An event emitted by the session engine
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    /// The radio moved between receiving noise, receiving a signal and transmitting
    StateChanged { from: RadioState, to: RadioState },

    /// Raw RSSI reading
    RssiUpdated {
        /// Signal strength in dBm
        dbm: f64,
    },

    /// VSWR computed from a settled forward/reverse power pair
    VswrChanged { vswr: f64 },

    PaTemperature(PaTemperature),

    /// Any progress message, state-changing or not
    Progress(ProgressMessage),

    /// The radio entered or left configuration mode
    ModeChanged { mode: RadioMode },

    /// Transaction or system error frame from the radio
    ErrorReported(ErrorMessage),

    /// Model and CCDI version string from an `m` frame
    ModelIdentified { model: String },

    /// The transport failed and the session stopped
    ConnectionLost { reason: String },
}
