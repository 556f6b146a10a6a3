//! The publish/subscribe hub.
//!
//! Broadcasters announce which message keys they may emit with
//! [`Mediator::register`]; listeners subscribe to wildcard patterns with
//! [`Mediator::on`]. A listener may carry `init`/`dispose` hooks that fire when
//! its pattern becomes available (some broadcaster registered for a matching
//! key) and unavailable again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::MediatorConfig;
use crate::error::MediatorError;
use crate::pattern::{can_fire, compile, covers};

/// A source of messages.
pub trait Broadcaster {
    /// Called when the broadcaster is registered, unless injection is
    /// suppressed, so it can keep a handle to the mediator.
    fn attach(&self, mediator: &Mediator) {
        let _ = mediator;
    }
}

pub type BroadcasterRef = Rc<dyn Broadcaster>;

pub type MessageFn = Rc<dyn Fn(Option<&Value>, &str)>;
pub type InitFn = Rc<dyn Fn(&[BroadcasterRef])>;
pub type DisposeFn = Rc<dyn Fn(Option<&BroadcasterRef>)>;

/// A listener with optional message, init and dispose hooks.
#[derive(Clone, Default)]
pub struct Listener {
    on_message: Option<MessageFn>,
    on_init: Option<InitFn>,
    on_dispose: Option<DisposeFn>,
}

impl Listener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the broadcast arguments and the concrete message key.
    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Value>, &str) + 'static,
    {
        self.on_message = Some(Rc::new(f));
        self
    }

    /// Called with the broadcasters that made the pattern available.
    pub fn on_init<F>(mut self, f: F) -> Self
    where
        F: Fn(&[BroadcasterRef]) + 'static,
    {
        self.on_init = Some(Rc::new(f));
        self
    }

    /// Called with the departing broadcaster, or `None` on [`Mediator::reset`].
    pub fn on_dispose<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&BroadcasterRef>) + 'static,
    {
        self.on_dispose = Some(Rc::new(f));
        self
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("on_message", &self.on_message.is_some())
            .field("on_init", &self.on_init.is_some())
            .field("on_dispose", &self.on_dispose.is_some())
            .finish()
    }
}

/// Id returned by [`Mediator::on`] and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of a registered listener, see [`Mediator::get_by_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerState {
    pub id: ListenerId,
    pub patterns: Vec<String>,
    pub init_done: bool,
    pub disposed: bool,
}

struct ListenerRecord {
    id: ListenerId,
    listener: Listener,
    init_done: Cell<bool>,
    disposed: Cell<bool>,
}

impl ListenerRecord {
    fn init(&self, broadcasters: &[BroadcasterRef]) {
        if self.init_done.get() {
            return;
        }
        self.init_done.set(true);
        self.disposed.set(false);
        trace!(listener = %self.id, "listener init");
        if let Some(init) = &self.listener.on_init {
            init(broadcasters);
        }
    }

    fn dispose(&self, broadcaster: Option<&BroadcasterRef>) {
        if !self.init_done.get() {
            return;
        }
        self.init_done.set(false);
        self.disposed.set(true);
        trace!(listener = %self.id, "listener dispose");
        if let Some(dispose) = &self.listener.on_dispose {
            dispose(broadcaster);
        }
    }
}

struct PatternEntry {
    matcher: Option<Regex>,
    listeners: Vec<Rc<ListenerRecord>>,
}

#[derive(Default)]
struct MediatorState {
    available: IndexMap<String, Vec<BroadcasterRef>>,
    patterns: IndexMap<String, PatternEntry>,
}

impl MediatorState {
    fn available_for(&self, pattern: &str, config: &MediatorConfig) -> Vec<BroadcasterRef> {
        let mut found: Vec<BroadcasterRef> = Vec::new();
        for (message, broadcasters) in &self.available {
            if !can_fire(pattern, message, config) {
                continue;
            }
            for broadcaster in broadcasters {
                if !found.iter().any(|known| Rc::ptr_eq(known, broadcaster)) {
                    found.push(broadcaster.clone());
                }
            }
        }
        found
    }

    fn records(&self) -> Vec<Rc<ListenerRecord>> {
        let mut records: Vec<Rc<ListenerRecord>> = Vec::new();
        for entry in self.patterns.values() {
            for record in &entry.listeners {
                if !records.iter().any(|known| known.id == record.id) {
                    records.push(record.clone());
                }
            }
        }
        records
    }
}

struct MediatorInner {
    config: MediatorConfig,
    next_id: Cell<u64>,
    state: RefCell<MediatorState>,
}

#[derive(Clone)]
pub struct Mediator {
    inner: Rc<MediatorInner>,
}

impl Mediator {
    pub fn new() -> Self {
        Self::build(MediatorConfig::default())
    }

    pub fn with_config(config: MediatorConfig) -> Result<Self, MediatorError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: MediatorConfig) -> Self {
        Self {
            inner: Rc::new(MediatorInner {
                config,
                next_id: Cell::new(1),
                state: RefCell::default(),
            }),
        }
    }

    pub fn config(&self) -> &MediatorConfig {
        &self.inner.config
    }

    fn downgrade(&self) -> Weak<MediatorInner> {
        Rc::downgrade(&self.inner)
    }

    fn next_id(&self) -> ListenerId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        ListenerId(id)
    }

    // --- broadcasters ----------------------------------------------------

    /// Makes `broadcaster` available for each of `keys`. Listeners whose
    /// pattern becomes available through a key that had no broadcaster yet
    /// are initialised with it.
    pub fn register(&self, broadcaster: &BroadcasterRef, keys: &[&str], no_broadcast_injection: bool) {
        if !no_broadcast_injection {
            broadcaster.attach(self);
        }
        for key in keys {
            let first = {
                let mut state = self.inner.state.borrow_mut();
                let broadcasters = state.available.entry((*key).to_owned()).or_default();
                if broadcasters.iter().any(|known| Rc::ptr_eq(known, broadcaster)) {
                    false
                } else {
                    broadcasters.push(broadcaster.clone());
                    broadcasters.len() == 1
                }
            };
            if !first {
                continue;
            }
            debug!(message = %key, "message available");
            let waiting: Vec<Rc<ListenerRecord>> = {
                let state = self.inner.state.borrow();
                state
                    .patterns
                    .iter()
                    .filter(|(pattern, _)| can_fire(pattern, key, &self.inner.config))
                    .flat_map(|(_, entry)| entry.listeners.iter().cloned())
                    .collect()
            };
            let single = std::slice::from_ref(broadcaster);
            for record in waiting {
                record.init(single);
            }
        }
    }

    /// Withdraws `broadcaster` from `keys` (and their descendants), or from
    /// every key when `keys` is `None`. Initialised listeners whose pattern
    /// is no longer available are disposed.
    pub fn unregister(&self, broadcaster: &BroadcasterRef, keys: Option<&[&str]>) {
        let stale: Vec<Rc<ListenerRecord>> = {
            let mut state = self.inner.state.borrow_mut();
            let separator = self.inner.config.separator.as_str();
            for (message, broadcasters) in state.available.iter_mut() {
                let selected = keys.map_or(true, |keys| keys.iter().any(|key| covers(key, message, separator)));
                if selected {
                    broadcasters.retain(|known| !Rc::ptr_eq(known, broadcaster));
                }
            }
            state.available.retain(|message, broadcasters| {
                if broadcasters.is_empty() {
                    debug!(message = %message, "message unavailable");
                }
                !broadcasters.is_empty()
            });
            let state = &*state;
            let mut live: Vec<ListenerId> = Vec::new();
            let mut stale: Vec<Rc<ListenerRecord>> = Vec::new();
            for (pattern, entry) in &state.patterns {
                if state.available_for(pattern, &self.inner.config).is_empty() {
                    stale.extend(entry.listeners.iter().cloned());
                } else {
                    live.extend(entry.listeners.iter().map(|record| record.id));
                }
            }
            // A listener stays up while any of its patterns is satisfiable.
            stale.retain(|record| !live.contains(&record.id));
            stale
        };
        for record in stale {
            record.dispose(Some(broadcaster));
        }
    }

    /// Broadcasters currently registered for exactly `key`.
    pub fn broadcasters(&self, key: &str) -> Vec<BroadcasterRef> {
        self.inner
            .state
            .borrow()
            .available
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    // --- listeners -------------------------------------------------------

    pub fn on<F>(&self, pattern: &str, f: F) -> ListenerId
    where
        F: Fn(Option<&Value>, &str) + 'static,
    {
        self.on_listener(pattern, Listener::new().on_message(f))
    }

    pub fn on_listener(&self, pattern: &str, listener: Listener) -> ListenerId {
        self.on_many(&[pattern], listener)
    }

    /// Registers one listener under several patterns; it shares a single id
    /// and a single init/dispose lifecycle.
    pub fn on_many(&self, patterns: &[&str], listener: Listener) -> ListenerId {
        let id = self.next_id();
        let record = Rc::new(ListenerRecord {
            id,
            listener,
            init_done: Cell::new(false),
            disposed: Cell::new(false),
        });
        let available = {
            let mut state = self.inner.state.borrow_mut();
            for pattern in patterns {
                state
                    .patterns
                    .entry((*pattern).to_owned())
                    .or_insert_with(|| PatternEntry {
                        matcher: compile(pattern, &self.inner.config),
                        listeners: Vec::new(),
                    })
                    .listeners
                    .push(record.clone());
            }
            let mut found: Vec<BroadcasterRef> = Vec::new();
            for pattern in patterns {
                for broadcaster in state.available_for(pattern, &self.inner.config) {
                    if !found.iter().any(|known| Rc::ptr_eq(known, &broadcaster)) {
                        found.push(broadcaster);
                    }
                }
            }
            found
        };
        trace!(listener = %id, patterns = ?patterns, "listener added");
        if !available.is_empty() {
            record.init(&available);
        }
        id
    }

    /// Like [`Mediator::on`], but the listener is removed before it handles
    /// its first message.
    pub fn once<F>(&self, pattern: &str, f: F) -> ListenerId
    where
        F: Fn(Option<&Value>, &str) + 'static,
    {
        let slot: Rc<Cell<Option<ListenerId>>> = Rc::default();
        let own_id = slot.clone();
        let weak = self.downgrade();
        let id = self.on(pattern, move |args, message| {
            if let (Some(inner), Some(id)) = (weak.upgrade(), own_id.take()) {
                Mediator { inner }.off(id);
            }
            f(args, message);
        });
        slot.set(Some(id));
        id
    }

    /// Removes listener `id` from every pattern. Empty patterns are dropped.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut state = self.inner.state.borrow_mut();
        let mut removed = false;
        for entry in state.patterns.values_mut() {
            let before = entry.listeners.len();
            entry.listeners.retain(|record| record.id != id);
            removed |= entry.listeners.len() != before;
        }
        state.patterns.retain(|_, entry| !entry.listeners.is_empty());
        removed
    }

    /// Delivers `args` to every listener whose pattern matches `message`.
    /// Listeners added or removed by a handler take effect from the next
    /// broadcast.
    pub fn broadcast(&self, message: &str, args: Option<&Value>) {
        let targets: Vec<MessageFn> = {
            let state = self.inner.state.borrow();
            state
                .patterns
                .values()
                .filter(|entry| entry.matcher.as_ref().is_some_and(|re| re.is_match(message)))
                .flat_map(|entry| entry.listeners.iter())
                .filter_map(|record| record.listener.on_message.clone())
                .collect()
        };
        trace!(message = %message, listeners = targets.len(), "broadcast");
        for target in targets {
            target(args, message);
        }
    }

    /// Whether any registered pattern matches `message`.
    pub fn is_listened(&self, message: &str) -> bool {
        self.inner
            .state
            .borrow()
            .patterns
            .values()
            .any(|entry| entry.matcher.as_ref().is_some_and(|re| re.is_match(message)))
    }

    pub fn get_by_id(&self, id: ListenerId) -> Option<ListenerState> {
        let state = self.inner.state.borrow();
        let mut found: Option<ListenerState> = None;
        for (pattern, entry) in &state.patterns {
            if let Some(record) = entry.listeners.iter().find(|record| record.id == id) {
                let snapshot = found.get_or_insert_with(|| ListenerState {
                    id,
                    patterns: Vec::new(),
                    init_done: record.init_done.get(),
                    disposed: record.disposed.get(),
                });
                snapshot.patterns.push(pattern.clone());
            }
        }
        found
    }

    pub fn is_init(&self, id: ListenerId) -> bool {
        self.get_by_id(id).is_some_and(|state| state.init_done)
    }

    pub fn is_disposed(&self, id: ListenerId) -> bool {
        self.get_by_id(id).is_some_and(|state| state.disposed)
    }

    /// Drops every broadcaster and listener. Listeners with a dispose hook
    /// are told with `None`.
    pub fn reset(&self) {
        let records = {
            let mut state = self.inner.state.borrow_mut();
            let records = state.records();
            *state = MediatorState::default();
            records
        };
        debug!(listeners = records.len(), "mediator reset");
        for record in records {
            if let Some(dispose) = &record.listener.on_dispose {
                dispose(None);
            }
        }
    }
}

impl Default for Mediator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Mediator")
            .field("config", &self.inner.config)
            .field("available", &state.available.keys().collect::<Vec<_>>())
            .field("patterns", &state.patterns.keys().collect::<Vec<_>>())
            .finish()
    }
}
