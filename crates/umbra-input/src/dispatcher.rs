//! Observer-style event dispatch.
//!
//! The dispatcher holds weak references: it never keeps a listener alive.
//! Listeners are notified in the order they were attached; a listener that
//! has been dropped is removed the next time an event is dispatched.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::event::InputEvent;

/// Receives input events from an [`EventDispatcher`].
pub trait EventListener {
    fn on_event(&mut self, event: &InputEvent);
}

/// Handle returned by [`EventDispatcher::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<(ListenerId, Weak<RefCell<dyn EventListener>>)>,
    next_id: u64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `listener` after every listener already attached.
    pub fn attach<L: EventListener + 'static>(&mut self, listener: &Rc<RefCell<L>>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        let listener: Rc<RefCell<dyn EventListener>> = listener.clone();
        self.listeners.push((id, Rc::downgrade(&listener)));
        id
    }

    /// Detach a listener. Returns `false` if it was not attached.
    pub fn detach(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(other, _)| *other != id);
        self.listeners.len() != before
    }

    /// Deliver `event` to every live listener. Returns how many received it.
    ///
    /// A listener that is already borrowed (dispatching from inside its own
    /// handler) is skipped.
    pub fn dispatch(&mut self, event: &InputEvent) -> usize {
        let mut delivered = 0;
        self.listeners.retain(|(id, weak)| {
            let Some(listener) = weak.upgrade() else {
                tracing::trace!("Dropping dead listener {:?}", id);
                return false;
            };
            if let Ok(mut listener) = listener.try_borrow_mut() {
                listener.on_event(event);
                delivered += 1;
            } else {
                tracing::warn!("Listener {:?} is busy, skipping event", id);
            }
            true
        });
        delivered
    }

    /// Number of attached listeners, including any dropped since the last
    /// dispatch.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::keyboard::KeyCode;

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<(&'static str, InputEvent)>>>,
    }

    impl EventListener for Recorder {
        fn on_event(&mut self, event: &InputEvent) {
            self.log.borrow_mut().push((self.name, *event));
        }
    }

    fn recorder(
        name: &'static str,
        log: &Rc<RefCell<Vec<(&'static str, InputEvent)>>>,
    ) -> Rc<RefCell<Recorder>> {
        Rc::new(RefCell::new(Recorder {
            name,
            log: log.clone(),
        }))
    }

    #[test]
    fn delivers_in_attachment_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, b, c) = (recorder("a", &log), recorder("b", &log), recorder("c", &log));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.attach(&b);
        dispatcher.attach(&a);
        dispatcher.attach(&c);

        let event = InputEvent::KeyPressed(KeyCode::KeyW);
        assert_eq!(dispatcher.dispatch(&event), 3);

        let names: Vec<_> = log.borrow().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn detached_listeners_stop_receiving() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (recorder("a", &log), recorder("b", &log));
        let mut dispatcher = EventDispatcher::new();
        let id_a = dispatcher.attach(&a);
        dispatcher.attach(&b);

        assert!(dispatcher.detach(id_a));
        assert!(!dispatcher.detach(id_a));
        dispatcher.dispatch(&InputEvent::KeyReleased(KeyCode::Escape));

        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0].0, "b");
    }

    #[test]
    fn dropped_listeners_are_pruned() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recorder("a", &log);
        let mut dispatcher = EventDispatcher::new();
        dispatcher.attach(&a);
        {
            let short_lived = recorder("gone", &log);
            dispatcher.attach(&short_lived);
        }
        assert_eq!(dispatcher.len(), 2);

        assert_eq!(dispatcher.dispatch(&InputEvent::KeyPressed(KeyCode::KeyA)), 1);
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn dispatcher_does_not_keep_listeners_alive() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recorder("a", &log);
        let mut dispatcher = EventDispatcher::new();
        dispatcher.attach(&a);
        assert_eq!(Rc::strong_count(&a), 1);
    }
}
