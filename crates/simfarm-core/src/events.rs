//! Typed event bus used to surface progress without printing.
//!
//! The core never renders anything itself: components emit tagged event
//! values and an external observer (progress UI, test harness) subscribes.

/// Listener registry for one event type.
///
/// Listeners are plain closures invoked in registration order; emission never
/// fails and never reenters the emitting component.
pub struct EventBus<T> {
    listeners: Vec<Box<dyn FnMut(&T)>>,
}

impl<T> EventBus<T> {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Registers a listener for every subsequent emission.
    pub fn subscribe(&mut self, listener: impl FnMut(&T) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Delivers an event to every registered listener.
    pub fn emit(&mut self, event: &T) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn listeners_receive_events_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let a = Rc::clone(&seen);
        bus.subscribe(move |event: &u32| a.borrow_mut().push(("a", *event)));
        let b = Rc::clone(&seen);
        bus.subscribe(move |event: &u32| b.borrow_mut().push(("b", *event)));

        bus.emit(&1);
        bus.emit(&2);

        assert_eq!(
            *seen.borrow(),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
    }
}
