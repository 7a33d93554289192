// src/events/bus.rs

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{trace, warn};

use super::{EventSink, PipelineEvent};

/// Fans events out to every subscribed sink, in subscription order.
pub struct EventBus<K, T> {
    sinks: Vec<Arc<dyn EventSink<K, T>>>,
}

impl<K, T> Default for EventBus<K, T> {
    fn default() -> Self {
        Self { sinks: Vec::new() }
    }
}

impl<K, T> fmt::Debug for EventBus<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl<K, T> EventBus<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: Arc<dyn EventSink<K, T>>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver `event` to every sink. A panicking sink is logged and skipped.
    pub fn emit(&self, event: &PipelineEvent<K, T>) {
        trace!(kind = event.kind(), sinks = self.sinks.len(), "emitting event");

        for (idx, sink) in self.sinks.iter().enumerate() {
            let delivered = catch_unwind(AssertUnwindSafe(|| event.deliver(sink.as_ref())));
            if delivered.is_err() {
                warn!(
                    kind = event.kind(),
                    sink = idx,
                    "event sink panicked; continuing run"
                );
            }
        }
    }
}
