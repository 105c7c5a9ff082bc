use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use crate::{Event, EventKind, InstanceId};

type Listener<T> = Arc<dyn Fn(&mut Event, &T) -> bool + Send + Sync>;

/// Identifies a listener registration, for later removal via `off()`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ListenerId(u64);

/// Types that name one or more event kinds, accepted wherever listeners are registered.
pub trait IntoEventKinds {
    /// Returns the named event kinds.
    fn into_event_kinds(self) -> Vec<EventKind>;
}

impl IntoEventKinds for EventKind {
    fn into_event_kinds(self) -> Vec<EventKind> {
        vec![self]
    }
}

impl<const N: usize> IntoEventKinds for [EventKind; N] {
    fn into_event_kinds(self) -> Vec<EventKind> {
        self.to_vec()
    }
}

impl IntoEventKinds for &[EventKind] {
    fn into_event_kinds(self) -> Vec<EventKind> {
        self.to_vec()
    }
}

/// An ordered list of listeners per event kind, dispatching events emitted by a `T`.
///
/// Listeners are invoked in registration order. The list is snapshotted at the start of each
/// dispatch, so a listener registration only affects events emitted after it.
pub(crate) struct EventChannel<T> {
    listeners: [Vec<(ListenerId, Listener<T>)>; EventKind::ALL.len()],

    next_listener_id: u64,
}

impl<T> EventChannel<T> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Default::default(),
            next_listener_id: 0,
        }
    }

    /// Registers `listener` for every kind in `kinds`, returning a single identity that
    /// covers all of the registrations.
    pub(crate) fn on<F>(&mut self, kinds: impl IntoEventKinds, listener: F) -> ListenerId
    where
        F: Fn(&mut Event, &T) -> bool + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id = self.next_listener_id.wrapping_add(1);

        let listener: Listener<T> = Arc::new(listener);

        for kind in kinds.into_event_kinds() {
            self.list_mut(kind).push((id, Arc::clone(&listener)));
        }

        id
    }

    /// Removes the registrations of `listener` for every kind in `kinds` or, if no listener
    /// is given, every registration for those kinds.
    pub(crate) fn off(&mut self, kinds: impl IntoEventKinds, listener: Option<ListenerId>) {
        for kind in kinds.into_event_kinds() {
            let list = self.list_mut(kind);

            match listener {
                Some(id) => list.retain(|(registered, _)| *registered != id),
                None => list.clear(),
            }
        }
    }

    /// The listeners registered for `kind`, in invocation order.
    pub(crate) fn listeners(&self, kind: EventKind) -> Vec<ListenerId> {
        self.list(kind).iter().map(|(id, _)| *id).collect()
    }

    /// Delivers `event` to the listeners of its kind, stopping early if a listener aborts it.
    pub(crate) fn dispatch(&self, event: &mut Event, emitter: &T, emitter_id: InstanceId) {
        event.set_target(emitter_id);
        event.clear_result();

        let snapshot: Vec<Listener<T>> = self
            .list(event.kind())
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            let result = listener(event, emitter);
            event.record_result(result);

            if event.is_aborted() {
                break;
            }
        }
    }

    fn listener_count(&self) -> usize {
        self.listeners.iter().map(Vec::len).sum()
    }

    fn list(&self, kind: EventKind) -> &Vec<(ListenerId, Listener<T>)> {
        self.listeners
            .get(kind.index())
            .expect("every event kind has a listener list")
    }

    fn list_mut(&mut self, kind: EventKind) -> &mut Vec<(ListenerId, Listener<T>)> {
        self.listeners
            .get_mut(kind.index())
            .expect("every event kind has a listener list")
    }
}

impl<T> fmt::Debug for EventChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("listener_count", &self.listener_count())
            .finish_non_exhaustive()
    }
}

// Manual impl; the derive would require `T: Clone`.
impl<T> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            next_listener_id: self.next_listener_id,
        }
    }
}

impl<T> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}
