//! External console mirroring.
//!
//! Something outside the test's own code (a driven browser page, a child
//! process) may produce console output worth keeping next to the test's
//! logs. Such a source implements [`ExternalConsole`]; the logger registers
//! one listener on it for the lifetime of the run and removes it again at
//! teardown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SmartLogResult;
use crate::value::Value;

/// One message observed on an external console.
#[derive(Debug, Clone)]
pub struct ConsoleMessage {
    /// Native message type, e.g. `log`, `warning`, `error`
    pub kind: String,
    pub args: Vec<Value>,
}

impl ConsoleMessage {
    pub fn new(kind: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind: kind.into(),
            args,
        }
    }

    /// Single-argument text message.
    pub fn text(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(kind, vec![Value::String(text.into())])
    }
}

/// Callback invoked for every message on the console.
pub type ConsoleListener = Arc<dyn Fn(&ConsoleMessage) + Send + Sync>;

/// Handle returned by [`ExternalConsole::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A console whose messages can be observed.
pub trait ExternalConsole: Send + Sync {
    fn subscribe(&self, listener: ConsoleListener) -> SmartLogResult<ListenerId>;

    fn unsubscribe(&self, id: ListenerId) -> SmartLogResult<()>;
}

/// In-process console that fans messages out to its listeners.
///
/// Used by the command wrapper (fed from child stdout/stderr) and handy in
/// tests. Cloning shares the listener list.
#[derive(Clone, Default)]
pub struct ConsoleHub {
    listeners: Arc<RwLock<Vec<(ListenerId, ConsoleListener)>>>,
    next_id: Arc<AtomicU64>,
}

impl ConsoleHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to every current listener.
    pub fn emit(&self, message: ConsoleMessage) {
        // Copy the list so listeners may (un)subscribe from inside a callback.
        let listeners: Vec<ConsoleListener> =
            self.listeners.read().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(&message);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl ExternalConsole for ConsoleHub {
    fn subscribe(&self, listener: ConsoleListener) -> SmartLogResult<ListenerId> {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        Ok(id)
    }

    fn unsubscribe(&self, id: ListenerId) -> SmartLogResult<()> {
        self.listeners.write().retain(|(lid, _)| *lid != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_hub_fan_out_and_unsubscribe() {
        let hub = ConsoleHub::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let id = hub
            .subscribe(Arc::new(move |_msg: &ConsoleMessage| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        hub.emit(ConsoleMessage::text("log", "one"));
        hub.unsubscribe(id).unwrap();
        hub.emit(ConsoleMessage::text("log", "two"));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(hub.listener_count(), 0);
    }
}
