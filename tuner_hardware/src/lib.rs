//! Transports implementing [`tuner_traits::HardwareChannel`].
//!
//! Only the in-memory simulator lives here; it backs the CLI's `sim`
//! transport and every integration test in the workspace.

pub mod error;
pub mod sim;
pub mod tuner;

pub use error::HwError;
pub use sim::{Registers, SimulatedChannels, WriteHook, WriteRecord};
pub use tuner::{TunerSim, install_cavity, true_detune};
