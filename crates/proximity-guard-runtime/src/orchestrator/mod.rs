//! Per-frame orchestration of a monitoring session.
//!
//! A session owns its collaborators and a context holding the tick counter,
//! the estimator (with its scale memory) and the safety state machine. Each
//! tick pulls one detector frame, samples depth for the detections of
//! interest, estimates the distance and forwards any resulting command to the
//! arm.

mod error;
mod pipeline;
mod result;
mod shutdown;

pub use error::SessionError;
pub use pipeline::FrameOrchestrator;
pub use result::TickOutcome;
pub use shutdown::ShutdownFlag;
