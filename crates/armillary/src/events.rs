//! Change notifications.
//!
//! Listeners are plain closures registered on the repository. A listener
//! that returns an error does not affect the operation that triggered the
//! event or the remaining listeners; the failure is logged and kept as a
//! [`NotificationFailure`] until the caller collects it.

use std::{error::Error, fmt};

use log::warn;

use armillary_core::element::Element;

use crate::operation::Operation;

/// Something the repository announces to its listeners.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// Fired before an operation is applied.
    BeforeExecuteOperation(&'a Operation),
    /// Elements that became live.
    Created(&'a [Element]),
    /// Elements that stopped being live, as they were at removal.
    Deleted(&'a [Element]),
    /// Live elements whose fields or parent changed.
    Updated(&'a [Element]),
    /// Fired after an operation was executed, undone or redone.
    OperationExecuted(&'a Operation),
    Undo(&'a Operation),
    Redo(&'a Operation),
}

impl Event<'_> {
    /// Stable event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BeforeExecuteOperation(_) => "beforeExecuteOperation",
            Self::Created(_) => "created",
            Self::Deleted(_) => "deleted",
            Self::Updated(_) => "updated",
            Self::OperationExecuted(_) => "operationExecuted",
            Self::Undo(_) => "undo",
            Self::Redo(_) => "redo",
        }
    }
}

/// Result returned by a listener.
pub type ListenerResult = Result<(), Box<dyn Error + Send + Sync>>;

type Listener = Box<dyn FnMut(&Event<'_>) -> ListenerResult>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(usize);

/// A listener error captured during event delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFailure {
    event: &'static str,
    message: String,
}

impl NotificationFailure {
    /// Name of the event being delivered.
    pub fn event(&self) -> &'static str {
        self.event
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for NotificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener failed on `{}`: {}", self.event, self.message)
    }
}

/// Ordered set of listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(SubscriptionId, Listener)>,
    failures: Vec<NotificationFailure>,
    next_id: usize,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("failures", &self.failures)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener; listeners run in subscription order.
    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&Event<'_>) -> ListenerResult + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Delivers an event to every listener.
    pub fn emit(&mut self, event: &Event<'_>) {
        for (_, listener) in &mut self.listeners {
            if let Err(err) = listener(event) {
                warn!(event = event.name(), err:% = err; "Listener failed");
                self.failures.push(NotificationFailure {
                    event: event.name(),
                    message: err.to_string(),
                });
            }
        }
    }

    /// Drains the recorded listener failures.
    pub fn take_failures(&mut self) -> Vec<NotificationFailure> {
        std::mem::take(&mut self.failures)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    #[test]
    fn test_listeners_run_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        for tag in ["first", "second"] {
            let seen = Rc::clone(&seen);
            bus.subscribe(move |event| {
                seen.borrow_mut().push(format!("{tag}:{}", event.name()));
                Ok(())
            });
        }

        let op = Operation::new("noop");
        bus.emit(&Event::OperationExecuted(&op));

        assert_eq!(
            *seen.borrow(),
            vec!["first:operationExecuted", "second:operationExecuted"]
        );
    }

    #[test]
    fn test_failing_listener_is_isolated() {
        let calls = Rc::new(RefCell::new(0));
        let mut bus = EventBus::new();
        bus.subscribe(|_| Err("boom".into()));
        let counter = Rc::clone(&calls);
        bus.subscribe(move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });

        bus.emit(&Event::Created(&[]));

        assert_eq!(*calls.borrow(), 1);
        let failures = bus.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].event(), "created");
        assert_eq!(failures[0].message(), "boom");
        assert!(bus.take_failures().is_empty());
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new();
        let id = bus.subscribe(|_| Err("never".into()));

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&Event::Updated(&[]));
        assert!(bus.take_failures().is_empty());
    }
}
