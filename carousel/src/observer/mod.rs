//! Observer contract.
//!
//! Observers receive one-directional, non-blocking notifications from the
//! execution context: log lines, prompts, progress, the terminal result and
//! errors. Commands flow the other way through [`crate::pipeline::PipelineRunner`].

mod channel;
mod sink;

pub use channel::{ChannelObserver, ObserverEvent};
pub use sink::{CollectingObserver, LoggingObserver, NoOpObserver, PipelineObserver};

#[cfg(test)]
pub use sink::MockPipelineObserver;
