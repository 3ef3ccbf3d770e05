//! Named errors a caller may want to match on, as distinct from the generic `anyhow::Error`
//! chains everything else in this crate surfaces through `.context(...)`.

use std::fmt;

/// `Task::from_template`/`TaskTemplate::bind` failed to substitute `bind` into a template
/// string.
#[derive(Debug)]
pub struct InvalidTemplate {
    pub template: String,
    pub key: String,
}

impl fmt::Display for InvalidTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "template {:?} references unknown bind key {:?}",
            self.template, self.key
        )
    }
}

impl std::error::Error for InvalidTemplate {}

/// `Worker::from_task` found `stdin` declared both as a standard stream and as a side-channel
/// name.
#[derive(Debug)]
pub struct ChannelCollision {
    pub name: String,
}

impl fmt::Display for ChannelCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel name {:?} collides with a standard stream",
            self.name
        )
    }
}

impl std::error::Error for ChannelCollision {}

/// `Worker::from_task` was given a `WriterSpec` that does not fit the Task it was built from.
#[derive(Debug)]
pub enum BadConfiguration {
    UnknownChannel { name: String },
    ChannelNotBound { name: String },
    ChannelNotWritable { name: String },
}

impl fmt::Display for BadConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownChannel { name } => {
                write!(f, "writer spec names unknown channel {name:?}")
            }
            Self::ChannelNotBound { name } => {
                write!(f, "channel {name:?} has no bound io; start() must run first")
            }
            Self::ChannelNotWritable { name } => {
                write!(f, "channel {name:?} does not expose a write operation")
            }
        }
    }
}

impl std::error::Error for BadConfiguration {}

/// `Coordinator::start` finished every startup executor without appending a single Worker.
#[derive(Debug)]
pub struct AllWorkersFailed {
    pub attempted: usize,
}

impl fmt::Display for AllWorkersFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "all {} child(ren) failed to start; no worker became viable",
            self.attempted
        )
    }
}

impl std::error::Error for AllWorkersFailed {}
