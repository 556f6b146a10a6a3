//! Reactive attribute models.
//!
//! A [`Model`] owns a map of JSON attributes plus the snapshot taken at the
//! last committed change. Writes go through the model's [`Schema`] (setters,
//! compare rules), reads through its getters, and every committed change is
//! dispatched to the listeners registered with [`Model::bind`],
//! [`Model::bind_all`] and [`Model::bind_unload`].
//!
//! `Model` is a cheap handle (`Rc`); clones refer to the same model and
//! compare equal.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::attributes::{diff_paths, walk, AttributeStore};
use crate::compare;
use crate::error::{ModelError, RuleError, ValidationError};
use crate::listener::{Binding, ListenerId, Registry};
use crate::schema::{Schema, SchemaRule};
use crate::sync::{ModelSync, SyncCallback};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique model id, rendered as `c<N>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

pub type ErrorHandler = Rc<dyn Fn(&ValidationError)>;

pub(crate) type ModelCallback = dyn Fn(&Model);

struct AttrBinding {
    keys: Vec<String>,
    callback: Box<dyn Fn(&[Option<Value>], &Model)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitState {
    Idle,
    Committing,
}

struct Pending {
    changes: IndexMap<String, Option<Value>>,
    silent: bool,
}

impl Default for Pending {
    fn default() -> Self {
        Self {
            changes: IndexMap::new(),
            silent: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Current,
    Previous,
}

struct ModelInner {
    client_id: ClientId,
    store: RefCell<AttributeStore>,
    schema: RefCell<Schema>,
    bound: RefCell<Registry<AttrBinding>>,
    bound_all: RefCell<Registry<ModelCallback>>,
    unload: RefCell<Registry<ModelCallback>>,
    commit_hooks: RefCell<Vec<Rc<ModelCallback>>>,
    state: Cell<CommitState>,
    pending: RefCell<Pending>,
    error_handler: RefCell<Option<ErrorHandler>>,
    sync: RefCell<Option<Rc<dyn ModelSync>>>,
    autosaver: Cell<Option<ListenerId>>,
    disposed: Cell<bool>,
}

/// Construction options for [`Model::with_options`].
#[derive(Default)]
pub struct ModelOptions {
    pub attributes: Map<String, Value>,
    pub schema: Schema,
    pub sync: Option<Rc<dyn ModelSync>>,
}

#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

#[derive(Clone)]
pub(crate) struct WeakModel(Weak<ModelInner>);

impl WeakModel {
    pub(crate) fn upgrade(&self) -> Option<Model> {
        self.0.upgrade().map(|inner| Model { inner })
    }
}

impl Model {
    pub fn new() -> Self {
        Self::build(AttributeStore::default(), Schema::new(), None)
    }

    /// Creates a model holding `attributes` without any schema. No listener
    /// is notified and `prev` equals the initial values.
    pub fn from_attributes(attributes: Map<String, Value>) -> Self {
        Self::build(AttributeStore::from_map(attributes), Schema::new(), None)
    }

    /// Creates a model whose initial attributes are written silently through
    /// `schema`, so setters may transform or reject them.
    pub fn with_options(options: ModelOptions) -> Result<Self, ModelError> {
        let model = Self::build(AttributeStore::default(), options.schema, options.sync);
        model.set_all(options.attributes, true)?;
        {
            let mut store = model.inner.store.borrow_mut();
            store.prune_undefined();
            store.snapshot();
        }
        Ok(model)
    }

    fn build(store: AttributeStore, schema: Schema, sync: Option<Rc<dyn ModelSync>>) -> Self {
        Self {
            inner: Rc::new(ModelInner {
                client_id: ClientId::next(),
                store: RefCell::new(store),
                schema: RefCell::new(schema),
                bound: RefCell::default(),
                bound_all: RefCell::default(),
                unload: RefCell::default(),
                commit_hooks: RefCell::default(),
                state: Cell::new(CommitState::Idle),
                pending: RefCell::default(),
                error_handler: RefCell::default(),
                sync: RefCell::new(sync),
                autosaver: Cell::new(None),
                disposed: Cell::new(false),
            }),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.inner.client_id
    }

    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakModel {
        WeakModel(Rc::downgrade(&self.inner))
    }

    // --- reads -----------------------------------------------------------

    pub fn get(&self, key: &str) -> Option<Value> {
        self.resolve(key, None, Side::Current)
    }

    /// Like [`Model::get`], returning `default` when the value is undefined.
    /// Required keys of a getter that resolve to undefined also receive
    /// `default`.
    pub fn get_or(&self, key: &str, default: Option<Value>) -> Option<Value> {
        self.resolve(key, default, Side::Current)
    }

    pub fn get_many(&self, keys: &[&str]) -> BTreeMap<String, Option<Value>> {
        keys.iter()
            .map(|key| ((*key).to_owned(), self.get(key)))
            .collect()
    }

    /// Value of `key` as of the last committed change.
    pub fn prev(&self, key: &str) -> Option<Value> {
        self.resolve(key, None, Side::Previous)
    }

    fn raw(&self, key: &str, side: Side) -> Option<Value> {
        let store = self.inner.store.borrow();
        match side {
            Side::Current => store.raw(key).cloned(),
            Side::Previous => store.raw_prev(key).cloned(),
        }
    }

    fn resolve(&self, key: &str, default: Option<Value>, side: Side) -> Option<Value> {
        let getter = self
            .inner
            .schema
            .borrow()
            .get(key)
            .and_then(|rule| rule.getter.clone().map(|getter| (getter, rule.require.clone())));
        if let Some((getter, require)) = getter {
            let args: Vec<Option<Value>> = require
                .iter()
                .map(|required| {
                    if required == key {
                        self.raw(key, side)
                    } else {
                        self.resolve(required, None, side).or_else(|| default.clone())
                    }
                })
                .collect();
            return getter(&args).or(default);
        }
        if !key.contains('.') {
            return self.raw(key, side).or(default);
        }
        let mut segments = key.split('.');
        let top = segments.next().and_then(|head| self.resolve(head, None, side));
        top.and_then(|value| walk(&value, segments).cloned()).or(default)
    }

    /// Whether `key` is stored or has a schema rule, and resolves to a value.
    pub fn has(&self, key: &str) -> bool {
        let known = self.inner.store.borrow().contains_key(key)
            || self.inner.schema.borrow().contains_key(key);
        known && self.get(key).is_some()
    }

    /// A model is new until it has an `id`.
    pub fn is_new(&self) -> bool {
        self.get("id").is_none()
    }

    /// Stored attributes as a JSON object. Getter-only keys are not
    /// materialised.
    pub fn to_json(&self) -> Value {
        self.inner.store.borrow().to_json()
    }

    // --- writes ----------------------------------------------------------

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool, ModelError> {
        self.set_all([(key, Some(value.into()))], false)
    }

    pub fn set_silent(&self, key: &str, value: impl Into<Value>) -> Result<bool, ModelError> {
        self.set_all([(key, Some(value.into()))], true)
    }

    /// Writes every pair, then commits once if anything changed and `silent`
    /// is false. Keys may be dot paths (`"a.b.0"`); `None` unsets.
    ///
    /// While a commit is being dispatched the writes are buffered and applied
    /// right after it, and `Ok(false)` is returned.
    pub fn set_all<I, K, V>(&self, attributes: I, silent: bool) -> Result<bool, ModelError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Option<Value>>,
    {
        let changes: Vec<(String, Option<Value>)> = attributes
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        if self.inner.state.get() == CommitState::Committing {
            let mut pending = self.inner.pending.borrow_mut();
            trace!(client_id = %self.client_id(), keys = changes.len(), "deferring set during commit");
            for (key, value) in changes {
                pending.changes.insert(key, value);
            }
            pending.silent = pending.silent && silent;
            return Ok(false);
        }
        self.apply(changes, silent)
    }

    fn apply(&self, changes: Vec<(String, Option<Value>)>, silent: bool) -> Result<bool, ModelError> {
        let mut changed = false;
        for (key, value) in changes {
            let (setter, compare) = match self.inner.schema.borrow().get(&key) {
                Some(rule) => (rule.setter.clone(), rule.compare.clone()),
                None => (None, None),
            };
            let value = match setter {
                Some(setter) => match setter(self, value, silent) {
                    Ok(value) => value,
                    Err(RuleError::Validation(err)) => {
                        self.handle_validation(&key, &err);
                        continue;
                    }
                    Err(RuleError::Failed(source)) => return Err(ModelError::Rule { key, source }),
                },
                None => value,
            };
            self.inner.store.borrow_mut().write(&key, value);
            let current = self.get(&key);
            let previous = self.prev(&key);
            let equal = match compare {
                Some(compare) => compare(current.as_ref(), previous.as_ref()),
                None => compare::recursive(current.as_ref(), previous.as_ref()),
            };
            changed |= !equal;
        }
        if changed && !silent {
            self.change()?;
            let mut store = self.inner.store.borrow_mut();
            store.snapshot();
            store.prune_undefined();
        }
        Ok(changed)
    }

    fn handle_validation(&self, key: &str, err: &ValidationError) {
        debug!(client_id = %self.client_id(), key = %key, error = %err, "validation failed");
        let handler = self.inner.error_handler.borrow().clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }

    pub fn unset(&self, key: &str) -> Result<bool, ModelError> {
        self.set_all([(key, None::<Value>)], false)
    }

    /// Unsets `keys`, or every stored key when `keys` is `None`.
    pub fn unset_many(&self, keys: Option<&[&str]>, silent: bool) -> Result<bool, ModelError> {
        let keys: Vec<String> = match keys {
            Some(keys) => keys.iter().map(|key| (*key).to_owned()).collect(),
            None => self.inner.store.borrow().keys().cloned().collect(),
        };
        self.set_all(keys.into_iter().map(|key| (key, None::<Value>)), silent)
    }

    /// Restores the attributes of the last committed change.
    pub fn revert(&self, silent: bool) -> Result<(), ModelError> {
        self.inner.store.borrow_mut().revert();
        if !silent {
            self.change()?;
        }
        Ok(())
    }

    /// Makes the current attributes the previous ones, then unsets every key.
    pub fn reset(&self, silent: bool) -> Result<(), ModelError> {
        let keys: Vec<String> = {
            let mut store = self.inner.store.borrow_mut();
            store.snapshot();
            store.keys().cloned().collect()
        };
        self.set_all(keys.into_iter().map(|key| (key, None::<Value>)), true)?;
        if !silent {
            self.change()?;
        }
        Ok(())
    }

    // --- change detection and dispatch -----------------------------------

    /// Keys (and nested dot paths) whose value differs from the previous
    /// snapshot. Nested paths are listed before their parent.
    pub fn changes(&self) -> Vec<String> {
        let keys: IndexSet<String> = {
            let schema = self.inner.schema.borrow();
            let store = self.inner.store.borrow();
            schema.keys().chain(store.keys()).cloned().collect()
        };
        let mut changed = Vec::new();
        for key in keys {
            let compare = self
                .inner
                .schema
                .borrow()
                .get(&key)
                .and_then(|rule| rule.compare.clone());
            let previous = self.prev(&key);
            let current = self.get(&key);
            match compare {
                Some(compare) => {
                    if !compare(previous.as_ref(), current.as_ref()) {
                        changed.push(key);
                    }
                }
                None => diff_paths(current.as_ref(), previous.as_ref(), &key, &mut changed),
            }
        }
        changed
    }

    /// Commits the current state: notifies per-key bindings whose keys
    /// changed, then any-change bindings, then takes a new snapshot and
    /// applies writes buffered during the dispatch.
    pub fn change(&self) -> Result<(), ModelError> {
        self.inner.state.set(CommitState::Committing);
        let changed = self.changes();
        trace!(client_id = %self.client_id(), changed = ?changed, "commit");

        let bound = self.inner.bound.borrow().snapshot();
        for (id, binding) in bound {
            if !self.inner.bound.borrow().contains(id) {
                continue;
            }
            if binding.keys.iter().any(|key| changed.contains(key)) {
                self.invoke(&binding);
            }
        }
        if !changed.is_empty() {
            let bound_all = self.inner.bound_all.borrow().snapshot();
            for (id, callback) in bound_all {
                if self.inner.bound_all.borrow().contains(id) {
                    callback(self);
                }
            }
        }
        let hooks = self.inner.commit_hooks.borrow().clone();
        for hook in hooks {
            hook(self);
        }

        self.inner.store.borrow_mut().snapshot();
        self.inner.state.set(CommitState::Idle);
        let pending = std::mem::take(&mut *self.inner.pending.borrow_mut());
        if pending.changes.is_empty() {
            return Ok(());
        }
        trace!(client_id = %self.client_id(), keys = pending.changes.len(), "flushing deferred set");
        self.apply(pending.changes.into_iter().collect(), pending.silent)
            .map(|_| ())
    }

    fn invoke(&self, binding: &AttrBinding) {
        let values: Vec<Option<Value>> = binding.keys.iter().map(|key| self.get(key)).collect();
        (binding.callback)(&values, self);
    }

    /// Invokes every per-key binding that watches `key`.
    pub(crate) fn fire_bindings_watching(&self, key: &str) {
        let bound = self.inner.bound.borrow().snapshot();
        for (id, binding) in bound {
            if binding.keys.iter().any(|watched| watched == key) && self.inner.bound.borrow().contains(id) {
                self.invoke(&binding);
            }
        }
    }

    pub(crate) fn add_commit_hook(&self, hook: Rc<ModelCallback>) {
        self.inner.commit_hooks.borrow_mut().push(hook);
    }

    pub(crate) fn models_keys(&self) -> Vec<String> {
        self.inner.schema.borrow().models_keys()
    }

    // --- listeners -------------------------------------------------------

    /// Calls `callback` with the resolved values of `keys` whenever a commit
    /// changes at least one of them.
    pub fn bind<I, S, F>(&self, keys: I, callback: F) -> Binding
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[Option<Value>], &Model) + 'static,
    {
        let id = ListenerId::next();
        let binding = Rc::new(AttrBinding {
            keys: keys.into_iter().map(Into::into).collect(),
            callback: Box::new(callback),
        });
        self.inner.bound.borrow_mut().insert(id, binding.clone());
        let weak = self.downgrade();
        let fire = {
            let weak = weak.clone();
            move || {
                if let Some(model) = weak.upgrade() {
                    model.invoke(&binding);
                }
            }
        };
        Binding::new(id, fire, move |id| weak.upgrade().is_some_and(|model| model.unbind(id)))
    }

    /// Calls `callback` after every commit that changed anything.
    pub fn bind_all<F>(&self, callback: F) -> Binding
    where
        F: Fn(&Model) + 'static,
    {
        let id = ListenerId::next();
        let callback: Rc<ModelCallback> = Rc::new(callback);
        self.inner.bound_all.borrow_mut().insert(id, callback.clone());
        self.model_binding(id, callback)
    }

    /// Calls `callback` when the model is disposed.
    pub fn bind_unload<F>(&self, callback: F) -> Binding
    where
        F: Fn(&Model) + 'static,
    {
        let id = ListenerId::next();
        let callback: Rc<ModelCallback> = Rc::new(callback);
        self.inner.unload.borrow_mut().insert(id, callback.clone());
        self.model_binding(id, callback)
    }

    fn model_binding(&self, id: ListenerId, callback: Rc<ModelCallback>) -> Binding {
        let weak = self.downgrade();
        let fire = {
            let weak = weak.clone();
            move || {
                if let Some(model) = weak.upgrade() {
                    callback(&model);
                }
            }
        };
        Binding::new(id, fire, move |id| weak.upgrade().is_some_and(|model| model.unbind(id)))
    }

    /// Removes the listener `id` from whichever registry holds it.
    pub fn unbind(&self, id: ListenerId) -> bool {
        if self.inner.autosaver.get() == Some(id) {
            self.inner.autosaver.set(None);
        }
        self.inner.bound.borrow_mut().remove(id)
            || self.inner.bound_all.borrow_mut().remove(id)
            || self.inner.unload.borrow_mut().remove(id)
    }

    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&ValidationError) + 'static,
    {
        *self.inner.error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    // --- schema ----------------------------------------------------------

    pub fn set_schema(&self, schema: Schema) {
        *self.inner.schema.borrow_mut() = schema;
    }

    /// Merges `schema` into the current one; only the fields each new rule
    /// defines replace existing ones.
    pub fn add_schema_rules(&self, schema: Schema) {
        self.inner.schema.borrow_mut().merge(schema);
    }

    /// Exposes `old` under the name `new`: reads of `new` resolve `old` and
    /// writes to `new` are forwarded to `old`.
    pub fn alias(&self, new: &str, old: &str) {
        let target = old.to_owned();
        let rule = SchemaRule::new()
            .get([old], |args| args.first().cloned().flatten())
            .set_with(move |model, value, silent| {
                model.set_all([(target.clone(), value)], silent)?;
                Ok(None)
            });
        self.inner.schema.borrow_mut().entry(new).merge(rule);
    }

    /// Formats `key` on read with `format`.
    pub fn format<F>(&self, key: &str, format: F)
    where
        F: Fn(Option<Value>) -> Option<Value> + 'static,
    {
        let rule = SchemaRule::new().get([key], move |args| format(args.first().cloned().flatten()));
        self.inner.schema.borrow_mut().entry(key).merge(rule);
    }

    /// Derives `key` from `require`.
    pub fn meta<I, S, F>(&self, key: &str, require: I, getter: F)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[Option<Value>]) -> Option<Value> + 'static,
    {
        let rule = SchemaRule::new().get(require, getter);
        self.inner.schema.borrow_mut().entry(key).merge(rule);
    }

    /// Transforms or validates writes to `key` with `setter`.
    pub fn setter<F>(&self, key: &str, setter: F)
    where
        F: Fn(Option<Value>) -> Result<Option<Value>, RuleError> + 'static,
    {
        let rule = SchemaRule::new().set(setter);
        self.inner.schema.borrow_mut().entry(key).merge(rule);
    }

    /// A get-or-set accessor bound to `key`.
    pub fn binder(&self, key: &str) -> Binder {
        Binder {
            model: self.clone(),
            key: key.to_owned(),
        }
    }

    // --- sync ------------------------------------------------------------

    pub fn set_sync(&self, sync: Rc<dyn ModelSync>) {
        *self.inner.sync.borrow_mut() = Some(sync);
    }

    fn sync(&self) -> Result<Rc<dyn ModelSync>, ModelError> {
        self.inner.sync.borrow().clone().ok_or(ModelError::NoSync)
    }

    /// Creates the model through its sync when it is new, updates it
    /// otherwise.
    pub fn save(&self, callback: Option<SyncCallback>) -> Result<(), ModelError> {
        let sync = self.sync()?;
        if self.is_new() {
            sync.create(self, callback);
        } else {
            sync.update(self, callback);
        }
        Ok(())
    }

    pub fn fetch(&self, callback: Option<SyncCallback>) -> Result<(), ModelError> {
        self.sync()?.read(self, callback);
        Ok(())
    }

    /// Saves after every change to `keys` (or to anything when `keys` is
    /// `None`). Only one autosaver is installed; later calls return `None`
    /// until it is unbound.
    pub fn autosave(
        &self,
        keys: Option<&[&str]>,
        callback: Option<Rc<dyn Fn(&Model)>>,
    ) -> Option<Binding> {
        if self.inner.autosaver.get().is_some() {
            return None;
        }
        let save = move |model: &Model| {
            let done = callback.clone().map(|callback| -> SyncCallback {
                Box::new(move |model: &Model| callback(model))
            });
            if let Err(err) = model.save(done) {
                warn!(client_id = %model.client_id(), error = %err, "autosave failed");
            }
        };
        let binding = match keys {
            Some(keys) => self.bind(keys.iter().copied(), move |_, model| save(model)),
            None => self.bind_all(save),
        };
        self.inner.autosaver.set(Some(binding.id()));
        Some(binding)
    }

    // --- teardown --------------------------------------------------------

    /// Notifies unload listeners, then drops every listener. A second call
    /// does nothing.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        debug!(client_id = %self.client_id(), "dispose");
        let unload = self.inner.unload.borrow().snapshot();
        for (_, callback) in unload {
            callback(self);
        }
        self.inner.bound.borrow_mut().clear();
        self.inner.bound_all.borrow_mut().clear();
        self.inner.unload.borrow_mut().clear();
        self.inner.commit_hooks.borrow_mut().clear();
        self.inner.autosaver.set(None);
        *self.inner.pending.borrow_mut() = Pending::default();
    }

    /// Asks the sync to delete the model, then disposes it.
    pub fn dispose_with_sync(&self, callback: Option<SyncCallback>) -> Result<(), ModelError> {
        self.sync()?.delete(self, callback);
        self.dispose();
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("client_id", &self.client_id())
            .field("attributes", &self.to_json())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Get-or-set accessor for a single attribute, see [`Model::binder`].
#[derive(Debug, Clone)]
pub struct Binder {
    model: Model,
    key: String,
}

impl Binder {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self) -> Option<Value> {
        self.model.get(&self.key)
    }

    pub fn set(&self, value: impl Into<Value>) -> Result<bool, ModelError> {
        self.model.set(&self.key, value)
    }

    pub fn set_silent(&self, value: impl Into<Value>) -> Result<bool, ModelError> {
        self.model.set_silent(&self.key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn model(value: Value) -> Model {
        match value {
            Value::Object(map) => Model::from_attributes(map),
            _ => Model::new(),
        }
    }

    #[test]
    fn test_client_id_display() {
        let a = Model::new();
        let b = Model::new();
        assert!(a.client_id().to_string().starts_with('c'));
        assert_ne!(a.client_id(), b.client_id());
    }

    #[test]
    fn test_initial_attributes_are_previous() {
        let m = model(json!({"a": 1}));
        assert_eq!(m.get("a"), Some(json!(1)));
        assert_eq!(m.prev("a"), Some(json!(1)));
        assert!(m.changes().is_empty());
    }

    #[test]
    fn test_get_or_default() {
        let m = Model::new();
        assert_eq!(m.get_or("missing", Some(json!("d"))), Some(json!("d")));
    }

    #[test]
    fn test_dot_path_get() {
        let m = model(json!({"a": {"b": [5, {"c": "x"}]}}));
        assert_eq!(m.get("a.b.0"), Some(json!(5)));
        assert_eq!(m.get("a.b.1.c"), Some(json!("x")));
        assert_eq!(m.get("a.z.c"), None);
    }

    #[test]
    fn test_set_returns_changed() {
        let m = Model::new();
        assert!(m.set("a", 1).unwrap());
        assert!(!m.set("a", 1).unwrap());
        assert_eq!(m.prev("a"), Some(json!(1)));
    }

    #[test]
    fn test_silent_set_keeps_prev() {
        let m = model(json!({"a": 1}));
        assert!(m.set_silent("a", 2).unwrap());
        assert_eq!(m.get("a"), Some(json!(2)));
        assert_eq!(m.prev("a"), Some(json!(1)));
        assert_eq!(m.changes(), vec!["a".to_string()]);
    }

    #[test]
    fn test_changes_reports_nested_paths() {
        let m = model(json!({"a": {"b": 1, "c": 2}}));
        m.set_silent("a.b", 3).unwrap();
        assert_eq!(m.changes(), vec!["a.b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_unset_prunes_after_commit() {
        let m = model(json!({"a": 1, "b": 2}));
        assert!(m.unset("a").unwrap());
        assert_eq!(m.get("a"), None);
        assert_eq!(m.to_json(), json!({"b": 2}));
        assert!(!m.has("a"));
    }

    #[test]
    fn test_unset_many_all() {
        let m = model(json!({"a": 1, "b": 2}));
        assert!(m.unset_many(None, false).unwrap());
        assert_eq!(m.to_json(), json!({}));
    }

    #[test]
    fn test_unbind_searches_all_registries() {
        let m = Model::new();
        let a = m.bind(["a"], |_, _| {});
        let b = m.bind_all(|_| {});
        let c = m.bind_unload(|_| {});
        assert!(m.unbind(a.id()));
        assert!(b.unbind());
        assert!(m.unbind(c.id()));
        assert!(!m.unbind(c.id()));
    }

    #[test]
    fn test_binding_fire_uses_current_values() {
        let m = model(json!({"a": 1, "b": 2}));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let binding = m.bind(["a", "b"], move |values, _| sink.borrow_mut().push(values.to_vec()));
        binding.fire();
        assert_eq!(*seen.borrow(), vec![vec![Some(json!(1)), Some(json!(2))]]);
    }

    #[test]
    fn test_binding_outlives_model() {
        let m = Model::new();
        let binding = m.bind_all(|_| {});
        drop(m);
        assert!(!binding.unbind());
        binding.fire();
    }

    #[test]
    fn test_binder() {
        let m = Model::new();
        let name = m.binder("name");
        assert_eq!(name.key(), "name");
        assert!(name.set("x").unwrap());
        assert_eq!(name.get(), Some(json!("x")));
        assert_eq!(m.get("name"), Some(json!("x")));
    }

    #[test]
    fn test_is_new() {
        let m = Model::new();
        assert!(m.is_new());
        m.set("id", 7).unwrap();
        assert!(!m.is_new());
    }

    #[test]
    fn test_save_without_sync() {
        let m = Model::new();
        assert!(matches!(m.save(None), Err(ModelError::NoSync)));
        assert!(matches!(m.fetch(None), Err(ModelError::NoSync)));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let m = Model::new();
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        m.bind_unload(move |_| counter.set(counter.get() + 1));
        m.dispose();
        m.dispose();
        assert_eq!(count.get(), 1);
        assert!(m.is_disposed());
    }

    #[test]
    fn test_equality_is_identity() {
        let a = model(json!({"x": 1}));
        let b = model(json!({"x": 1}));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
