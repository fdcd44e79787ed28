//! Actor-based background maintenance.

pub mod request_reply;
pub mod sweeper;

pub use request_reply::{create_request_reply, send_response, ResponseChannel};
pub use sweeper::{CredentialSweeperAgent, SweepExpired, SweepReport, SweepTargets};
