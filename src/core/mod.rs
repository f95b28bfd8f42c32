// Core radio model: activity state machine and derived measurements
pub mod metrics;
pub mod state;

// Re-export commonly used types
pub use metrics::{calculate_degrees, is_plausible_temperature, VswrFormula, MAX_PLAUSIBLE_TEMP_C};
pub use state::{RadioState, StateMachine, Transition};
