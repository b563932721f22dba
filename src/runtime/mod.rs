//! Container runtime access layer
//!
//! Everything the tool does to the outside world flows through this module:
//! a [`CommandRunner`] executes the runtime binary, [`RuntimeClient`] renders
//! typed operations into invocations, and [`records`] gives inventory queries
//! a structured shape. Higher layers never touch `tokio::process` directly.

pub mod client;
pub mod command;
pub mod error;
pub mod mock;
pub mod records;

pub use client::RuntimeClient;
pub use command::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use error::RuntimeError;
pub use mock::MockRunner;
pub use records::{ContainerRecord, ImageRecord, NetworkRecord, StatsRecord, VolumeRecord};
