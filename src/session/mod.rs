// Radio session engine
// A listener task owns the transport; a poller and a temperature timer query through it
pub mod config;
pub mod error;
pub mod events;
mod listener;
mod poller;
pub mod radio;
pub mod slots;

pub use config::{ConfigError, SessionConfig};
pub use error::{RadioError, RadioResult};
pub use events::{PaTemperature, RadioEvent};
pub use radio::TaitRadio;
