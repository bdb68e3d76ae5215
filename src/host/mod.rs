//! Host-facing contract and the stdio bridge used by native shells.

pub mod contract;
pub mod stdio;
pub mod surface;

pub use contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
pub use stdio::{BridgeSetup, run_bridge, run_stdio_bridge};
pub use surface::HostSurfaceProvider;
