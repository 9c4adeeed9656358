//! Resource timeline scheduling: a board of resource lanes with
//! drag-to-reschedule, optimistic commits with rollback, and pluggable
//! scheduling strategies.

pub mod board;
pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod model;
pub mod port;

pub use board::{BoardObserver, Notice, ScheduleBoard, Settlement, Submission};
pub use config::BoardConfig;
pub use engine::{SchedulingEngine, Strategy, StrategyOutcome};
pub use port::{MemoryBackend, ReschedulePort, SnapshotSource};
