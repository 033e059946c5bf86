pub mod driver;
pub mod signal;

pub use driver::{PresenceSwitch, SimulatedDriver, SimulatedProfile};
pub use signal::SignalGenerator;
