// TAIT-CCDI: Tait radio CCDI protocol codec and session engine

pub mod ccdi;
pub mod core;
pub mod serial;
pub mod session;

// Re-export commonly used types
pub use ccdi::{
    Bandwidth, CcdiError, CcdiFrame, Direction, ErrorMessage, PowerLevel, ProgressMessage,
    ProgressType, QueryResponse, QueryType, RadioMode,
};
pub use core::{RadioState, VswrFormula};
pub use serial::{SerialConfig, SerialError, SerialPort, Transport};
pub use session::{PaTemperature, RadioError, RadioEvent, RadioResult, SessionConfig, TaitRadio};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
