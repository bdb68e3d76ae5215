//! Blink detection worker: line protocol, process management and the
//! supervising state machine.

pub mod error;
pub mod process;
pub mod protocol;
pub mod supervisor;
pub mod sweep;

pub use error::DetectorError;
pub use process::{
    ProcessLauncher, TerminationTier, WorkerEvent, WorkerEventSender, WorkerHandle,
    WorkerLauncher, locate_worker,
};
pub use protocol::{LineBuffer, WorkerCommand, WorkerMessage, WorkerStatus};
pub use supervisor::{
    DetectorFault, DetectorSignal, DetectorSupervisor, RetryDecision, RetryPolicy, Termination,
    WorkerPhase,
};
