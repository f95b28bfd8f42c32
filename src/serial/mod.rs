// Serial communication with the radio
pub mod comm;
pub mod transport;

#[cfg(test)]
pub mod mock;

pub use comm::{SerialConfig, SerialError, SerialPort};
pub use transport::Transport;
