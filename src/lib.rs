//! Coordinates a pool of concurrent child processes fed from a single multi-channel input
//! stream: one producer feeds items, the pool fans each item out across every running child's
//! input channels, and an orderly shutdown drains every channel before the children are reaped.

pub mod channel;
pub mod coordinator;
pub mod error;
pub mod process;
pub mod settings;
pub mod signals;
pub mod sync;
pub mod task;
pub mod threads;
pub mod worker;
pub mod writer;

pub use channel::{Channel, ChannelIo, Direction, Mode, StdStream};
pub use coordinator::{Coordinator, Tuning, with_coordinator};
pub use sync::SyncContext;
pub use task::{Args, SideChannelSpec, Task, TaskTemplate};
pub use worker::{Worker, WriterSpec};
