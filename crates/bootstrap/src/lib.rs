//! Per-unit coordination that gets a group of CockroachDB units to
//! initialize exactly one cluster and converge on it.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod coordinator;
mod dispatcher;
mod error;
mod notification;
mod state;
mod status;

pub use config::{Config, DEFAULT_REPLICAS, DEFAULT_VERSION};
pub use coordinator::{
    Coordinator, CoordinatorOptions, Outcome, StartDecision, StartedDecision, decide_start,
    decide_started,
};
pub use dispatcher::{Dispatcher, RoundReport};
pub use error::{Error, Result};
pub use notification::Notification;
pub use state::{FileStateStore, LocalState, MemoryStateStore, StateStore, UnitState};
pub use status::{
    EXTRA_UNIT_MESSAGE, INITIALIZING_MESSAGE, UnitStatus, WAITING_FOR_LEADER_MESSAGE,
};
