//! raft3d-state: the replicated domain model.
//!
//! Holds everything a replica needs to turn a committed log prefix into
//! state, and nothing that talks to the network:
//!
//! - **`types`**: `Printer`, `Filament`, `PrintJob` and the job lifecycle
//! - **`command`**: the closed set of log commands and their JSON codec
//! - **`domain`**: `DomainState` and its deterministic `apply`
//!
//! All collections are `BTreeMap`s so that two replicas holding the same
//! state serialize it to the same bytes.

pub mod command;
pub mod domain;
pub mod error;
pub mod types;

pub use command::Command;
pub use domain::{Applied, DomainState};
pub use error::{CodecError, CodecResult};
pub use types::*;
