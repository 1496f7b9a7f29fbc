//! Bridges `tracing` events into a [`LogSink`].

use super::LogSink;
use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A layer that forwards every event it sees through a [`LogSink`].
///
/// Events are rendered as `LEVEL target: message key=value ...`.
#[derive(Debug, Clone)]
pub struct LogSinkLayer {
    sink: LogSink,
}

impl LogSinkLayer {
    /// Creates a layer forwarding into `sink`.
    #[must_use]
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }
}

impl<S: Subscriber> Layer<S> for LogSinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        let mut text = format!("{} {}: {}", meta.level(), meta.target(), visitor.message);
        for (name, value) in &visitor.fields {
            let _ = write!(text, " {name}={value}");
        }
        self.sink.line(&text);
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: Vec<(&'static str, String)>,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push((field.name(), format!("{value:?}")));
        }
    }
}
