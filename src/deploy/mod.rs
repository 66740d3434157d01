//! Multi-host deployment: local artifact preparation and the sequential
//! per-host upload / execute loop.

pub mod artifacts;
pub mod orchestrator;

pub use artifacts::{PreparedArtifacts, TransferSpec};
pub use orchestrator::{DEFAULT_RUN_TIMEOUT, Deployer, arm_deadline};
