//! Listener identity, the handle returned by every `bind*` call, and the
//! id-keyed callback registry shared by models and collections.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically increasing listener id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a registered listener.
///
/// Holds only weak references to its owner, so keeping a `Binding` around
/// never keeps a model or collection alive.
pub struct Binding {
    id: ListenerId,
    fire: Rc<dyn Fn()>,
    unbind: Rc<dyn Fn(ListenerId) -> bool>,
}

impl Binding {
    pub(crate) fn new(
        id: ListenerId,
        fire: impl Fn() + 'static,
        unbind: impl Fn(ListenerId) -> bool + 'static,
    ) -> Self {
        Self {
            id,
            fire: Rc::new(fire),
            unbind: Rc::new(unbind),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Invokes the listener once with the current state, as if a change had
    /// just been committed.
    pub fn fire(&self) -> &Self {
        (self.fire)();
        self
    }

    /// Removes the listener. Returns `false` if it was already gone or the
    /// owner has been dropped.
    pub fn unbind(&self) -> bool {
        (self.unbind)(self.id)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding").field("id", &self.id).finish()
    }
}

impl From<&Binding> for ListenerId {
    fn from(binding: &Binding) -> Self {
        binding.id
    }
}

/// Insertion-ordered callbacks keyed by [`ListenerId`].
///
/// Dispatch always goes through [`Registry::snapshot`] so that callbacks may
/// bind or unbind while the registry is being walked.
pub(crate) struct Registry<F: ?Sized> {
    entries: Vec<(ListenerId, Rc<F>)>,
}

impl<F: ?Sized> Default for Registry<F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<F: ?Sized> Registry<F> {
    pub(crate) fn insert(&mut self, id: ListenerId, callback: Rc<F>) {
        self.entries.push((id, callback));
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn contains(&self, id: ListenerId) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    pub(crate) fn snapshot(&self) -> Vec<(ListenerId, Rc<F>)> {
        self.entries.clone()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
