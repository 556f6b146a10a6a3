//! Ordered, observable collections of models.
//!
//! A [`Collection`] embeds a [`Model`] for its own attributes and keeps an
//! ordered member list. It watches every member and batches what happened
//! since the last commit into four channels, dispatched in this order after
//! the embedded model's own bindings:
//!
//! 1. [`Collection::model_change`] when the member order changed,
//! 2. [`Collection::any_model_change`] (and bindings of schema keys flagged
//!    with [`SchemaRule::models`](crate::SchemaRule::models)) when a member
//!    value changed,
//! 3. [`Collection::bind_add`] once per added member,
//! 4. [`Collection::bind_remove`] once per removed member.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::attributes::is_truthy;
use crate::error::ModelError;
use crate::listener::{Binding, ListenerId, Registry};
use crate::model::{ClientId, Model, ModelOptions};
use crate::sort::insertion_sort_by;

pub type Comparator = Rc<dyn Fn(&Model, &Model) -> Ordering>;

/// Builds members from plain attributes.
pub type ModelFactory = Rc<dyn Fn(Map<String, Value>) -> Result<Model, ModelError>>;

pub(crate) fn default_factory() -> ModelFactory {
    Rc::new(|attributes| Ok(Model::from_attributes(attributes)))
}

/// Identifies a removed member: its `id` attribute when it has one, its
/// client id otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberKey {
    Id(Value),
    Client(ClientId),
}

impl MemberKey {
    pub fn of(model: &Model) -> Self {
        match model.get("id") {
            Some(id) => Self::Id(id),
            None => Self::Client(model.client_id()),
        }
    }
}

/// Something [`Collection::add_all`] can insert.
pub enum AddItem {
    Model(Model),
    Attributes(Map<String, Value>),
}

impl From<Model> for AddItem {
    fn from(model: Model) -> Self {
        Self::Model(model)
    }
}

impl From<&Model> for AddItem {
    fn from(model: &Model) -> Self {
        Self::Model(model.clone())
    }
}

impl From<Map<String, Value>> for AddItem {
    fn from(attributes: Map<String, Value>) -> Self {
        Self::Attributes(attributes)
    }
}

/// Member predicate used by the filtering operations.
#[derive(Clone)]
pub struct Filter(Rc<dyn Fn(&Model) -> bool>);

impl Filter {
    pub fn by<F>(predicate: F) -> Self
    where
        F: Fn(&Model) -> bool + 'static,
    {
        Self(Rc::new(predicate))
    }

    /// Matches members whose `key` attribute is truthy.
    pub fn attr(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::by(move |model| is_truthy(model.get(&key).as_ref()))
    }

    pub fn matches(&self, model: &Model) -> bool {
        (self.0)(model)
    }
}

impl From<&str> for Filter {
    fn from(key: &str) -> Self {
        Self::attr(key)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter")
    }
}

#[derive(Clone)]
struct Member {
    model: Model,
    change_listener: ListenerId,
    unload_listener: ListenerId,
}

#[derive(Default)]
struct PendingChanges {
    order_changed: bool,
    any_value_changed: bool,
    added: Vec<Model>,
    removed: Vec<(Model, MemberKey)>,
}

type CollectionCallback = dyn Fn(&Collection);
type RemoveCallback = dyn Fn(&Model, &MemberKey);

struct CollectionInner {
    model: Model,
    members: RefCell<Vec<Member>>,
    comparator: RefCell<Option<Comparator>>,
    factory: ModelFactory,
    pending: RefCell<PendingChanges>,
    model_change: RefCell<Registry<CollectionCallback>>,
    any_model_change: RefCell<Registry<CollectionCallback>>,
    added: RefCell<Registry<dyn Fn(&Model)>>,
    removed: RefCell<Registry<RemoveCallback>>,
}

/// Construction options for [`Collection::with_options`].
#[derive(Default)]
pub struct CollectionOptions {
    /// Options of the embedded model holding the collection's own attributes.
    pub model: ModelOptions,
    pub models: Vec<Model>,
    pub comparator: Option<Comparator>,
    pub factory: Option<ModelFactory>,
}

#[derive(Clone)]
pub struct Collection {
    inner: Rc<CollectionInner>,
}

impl Collection {
    pub fn new() -> Self {
        Self::from_parts(Model::new(), None, default_factory())
    }

    /// Builds a collection and silently inserts `options.models`.
    pub fn with_options(options: CollectionOptions) -> Result<Self, ModelError> {
        let model = Model::with_options(options.model)?;
        let factory = options.factory.unwrap_or_else(default_factory);
        let collection = Self::from_parts(model, options.comparator, factory);
        collection.add_all(options.models, None, true)?;
        collection.inner.pending.take();
        Ok(collection)
    }

    fn from_parts(model: Model, comparator: Option<Comparator>, factory: ModelFactory) -> Self {
        let inner = Rc::new(CollectionInner {
            model,
            members: RefCell::default(),
            comparator: RefCell::new(comparator),
            factory,
            pending: RefCell::default(),
            model_change: RefCell::default(),
            any_model_change: RefCell::default(),
            added: RefCell::default(),
            removed: RefCell::default(),
        });
        let weak = Rc::downgrade(&inner);
        inner.model.add_commit_hook(Rc::new(move |_: &Model| {
            if let Some(collection) = upgrade(&weak) {
                collection.dispatch();
            }
        }));
        Self { inner }
    }

    fn downgrade(&self) -> Weak<CollectionInner> {
        Rc::downgrade(&self.inner)
    }

    /// The embedded model holding the collection's own attributes.
    pub fn as_model(&self) -> &Model {
        &self.inner.model
    }

    // --- own attributes --------------------------------------------------

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.model.get(key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool, ModelError> {
        self.inner.model.set(key, value)
    }

    pub fn set_silent(&self, key: &str, value: impl Into<Value>) -> Result<bool, ModelError> {
        self.inner.model.set_silent(key, value)
    }

    pub fn bind<I, S, F>(&self, keys: I, callback: F) -> Binding
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[Option<Value>], &Model) + 'static,
    {
        self.inner.model.bind(keys, callback)
    }

    pub fn bind_all<F>(&self, callback: F) -> Binding
    where
        F: Fn(&Model) + 'static,
    {
        self.inner.model.bind_all(callback)
    }

    /// Commits pending member changes and the embedded model's attributes.
    pub fn change(&self) -> Result<(), ModelError> {
        self.inner.model.change()
    }

    // --- membership ------------------------------------------------------

    pub fn add(&self, item: impl Into<AddItem>) -> Result<bool, ModelError> {
        self.add_all([item.into()], None, false)
    }

    /// Inserts `items` as a contiguous run starting at `index` (the end when
    /// `None`, counted from the end when negative), skipping models already
    /// present. Returns whether anything was inserted.
    pub fn add_all<I>(&self, items: I, index: Option<isize>, silent: bool) -> Result<bool, ModelError>
    where
        I: IntoIterator,
        I::Item: Into<AddItem>,
    {
        let len = self.len();
        let mut cursor = match index {
            None => len,
            Some(index) => clamp_index(index, len),
        };
        let mut inserted = false;
        for item in items {
            let model = match item.into() {
                AddItem::Model(model) => model,
                AddItem::Attributes(attributes) => (self.inner.factory)(attributes)?,
            };
            if self.contains(&model) {
                continue;
            }
            let member = self.watch(model.clone());
            {
                let mut members = self.inner.members.borrow_mut();
                let at = cursor.min(members.len());
                members.insert(at, member);
            }
            cursor += 1;
            trace!(client_id = %model.client_id(), "member added");
            let mut pending = self.inner.pending.borrow_mut();
            pending.order_changed = true;
            pending.added.push(model);
            inserted = true;
        }
        if !inserted {
            return Ok(false);
        }
        self.resort();
        if !silent {
            self.change()?;
        }
        Ok(true)
    }

    /// Builds a member from `attributes` with the factory and inserts it at
    /// the front.
    pub fn new_model(&self, attributes: Map<String, Value>, silent: bool) -> Result<Model, ModelError> {
        let model = (self.inner.factory)(attributes)?;
        self.add_all([model.clone()], Some(0), silent)?;
        Ok(model)
    }

    fn watch(&self, model: Model) -> Member {
        let weak = self.downgrade();
        let change = model.bind_all({
            let weak = weak.clone();
            move |_| {
                if let Some(collection) = upgrade(&weak) {
                    collection.member_changed();
                }
            }
        });
        let unload = model.bind_unload(move |member| {
            if let Some(collection) = upgrade(&weak) {
                if let Err(err) = collection.remove(member) {
                    warn!(client_id = %member.client_id(), error = %err, "removing disposed member failed");
                }
            }
        });
        Member {
            model,
            change_listener: change.id(),
            unload_listener: unload.id(),
        }
    }

    fn member_changed(&self) {
        self.inner.pending.borrow_mut().any_value_changed = true;
        self.resort();
        if let Err(err) = self.change() {
            warn!(error = %err, "collection commit after member change failed");
        }
    }

    pub fn remove(&self, model: &Model) -> Result<bool, ModelError> {
        self.remove_all([model], false)
    }

    /// Removes every listed member and detaches the collection's listeners
    /// from it. Returns whether anything was removed.
    pub fn remove_all<'a, I>(&self, models: I, silent: bool) -> Result<bool, ModelError>
    where
        I: IntoIterator<Item = &'a Model>,
    {
        let mut removed = false;
        for model in models {
            let member = {
                let mut members = self.inner.members.borrow_mut();
                match members.iter().position(|member| member.model == *model) {
                    Some(position) => members.remove(position),
                    None => continue,
                }
            };
            model.unbind(member.change_listener);
            model.unbind(member.unload_listener);
            let key = MemberKey::of(model);
            trace!(client_id = %model.client_id(), "member removed");
            let mut pending = self.inner.pending.borrow_mut();
            pending.order_changed = true;
            pending.removed.push((model.clone(), key));
            removed = true;
        }
        if !removed {
            return Ok(false);
        }
        self.resort();
        if !silent {
            self.change()?;
        }
        Ok(true)
    }

    /// Replaces the membership with `models`: members not listed are removed,
    /// listed models not yet present are appended.
    pub fn set_models(&self, models: &[Model], silent: bool) -> Result<bool, ModelError> {
        let stale: Vec<Model> = self
            .models()
            .into_iter()
            .filter(|model| !models.contains(model))
            .collect();
        let removed = self.remove_all(&stale, true)?;
        let added = self.add_all(models, None, true)?;
        let changed = removed || added;
        if changed && !silent {
            self.change()?;
        }
        Ok(changed)
    }

    pub fn clear(&self, silent: bool) -> Result<bool, ModelError> {
        self.remove_all(&self.models(), silent)
    }

    /// Removes the members matching `filter`.
    pub fn clear_where(&self, filter: impl Into<Filter>, silent: bool) -> Result<bool, ModelError> {
        let doomed = self.models_where(filter);
        self.remove_all(&doomed, silent)
    }

    /// Removes the members not matching `filter`.
    pub fn keep(&self, filter: impl Into<Filter>, silent: bool) -> Result<bool, ModelError> {
        let filter = filter.into();
        let doomed: Vec<Model> = self
            .models()
            .into_iter()
            .filter(|model| !filter.matches(model))
            .collect();
        self.remove_all(&doomed, silent)
    }

    // --- ordering --------------------------------------------------------

    pub fn set_comparator<F>(&self, comparator: F, silent: bool) -> Result<(), ModelError>
    where
        F: Fn(&Model, &Model) -> Ordering + 'static,
    {
        *self.inner.comparator.borrow_mut() = Some(Rc::new(comparator));
        self.sort(silent)
    }

    /// Drops the comparator; the current order is kept.
    pub fn clear_comparator(&self) {
        *self.inner.comparator.borrow_mut() = None;
    }

    /// Re-sorts with the comparator (a no-op without one) and commits unless
    /// `silent`, whether or not the order changed.
    pub fn sort(&self, silent: bool) -> Result<(), ModelError> {
        if self.inner.comparator.borrow().is_none() {
            return Ok(());
        }
        self.resort();
        if !silent {
            self.change()?;
        }
        Ok(())
    }

    fn resort(&self) -> bool {
        let comparator = self.inner.comparator.borrow().clone();
        let Some(comparator) = comparator else {
            return false;
        };
        let mut members = self.inner.members.borrow().clone();
        let inverted = insertion_sort_by(&mut members, |a, b| comparator(&a.model, &b.model));
        if inverted {
            trace!(len = members.len(), "member order changed");
            *self.inner.members.borrow_mut() = members;
            self.inner.pending.borrow_mut().order_changed = true;
        }
        inverted
    }

    // --- queries ---------------------------------------------------------

    /// Member at `index`; negative indices count from the end.
    pub fn at(&self, index: isize) -> Option<Model> {
        let members = self.inner.members.borrow();
        let index = if index < 0 {
            members.len().checked_sub(index.unsigned_abs())?
        } else {
            index.unsigned_abs()
        };
        members.get(index).map(|member| member.model.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, model: &Model) -> bool {
        self.index_of(model).is_some()
    }

    pub fn index_of(&self, model: &Model) -> Option<usize> {
        self.inner
            .members
            .borrow()
            .iter()
            .position(|member| member.model == *model)
    }

    /// First member whose `id` equals `id`. A number and a string holding the
    /// same numeric value are considered equal.
    pub fn get_by_id(&self, id: &Value) -> Option<Model> {
        self.models()
            .into_iter()
            .find(|model| model.get("id").is_some_and(|own| same_id(&own, id)))
    }

    pub fn models(&self) -> Vec<Model> {
        self.inner
            .members
            .borrow()
            .iter()
            .map(|member| member.model.clone())
            .collect()
    }

    pub fn models_where(&self, filter: impl Into<Filter>) -> Vec<Model> {
        let filter = filter.into();
        self.models()
            .into_iter()
            .filter(|model| filter.matches(model))
            .collect()
    }

    /// `key` of every member, in order.
    pub fn pluck(&self, key: &str) -> Vec<Option<Value>> {
        self.models().iter().map(|model| model.get(key)).collect()
    }

    /// One map per member holding the defined, non-null values of `keys`.
    pub fn pluck_many(&self, keys: &[&str]) -> Vec<Map<String, Value>> {
        self.models()
            .iter()
            .map(|model| {
                keys.iter()
                    .filter_map(|key| match model.get(key) {
                        None | Some(Value::Null) => None,
                        Some(value) => Some(((*key).to_owned(), value)),
                    })
                    .collect()
            })
            .collect()
    }

    // --- listeners -------------------------------------------------------

    /// Fires after a commit in which the member order changed.
    pub fn model_change<F>(&self, callback: F) -> Binding
    where
        F: Fn(&Collection) + 'static,
    {
        let id = ListenerId::next();
        let callback: Rc<CollectionCallback> = Rc::new(callback);
        self.inner.model_change.borrow_mut().insert(id, callback.clone());
        self.collection_binding(id, callback)
    }

    /// Fires after a commit in which any member value changed.
    pub fn any_model_change<F>(&self, callback: F) -> Binding
    where
        F: Fn(&Collection) + 'static,
    {
        let id = ListenerId::next();
        let callback: Rc<CollectionCallback> = Rc::new(callback);
        self.inner.any_model_change.borrow_mut().insert(id, callback.clone());
        self.collection_binding(id, callback)
    }

    fn collection_binding(&self, id: ListenerId, callback: Rc<CollectionCallback>) -> Binding {
        let weak = self.downgrade();
        let fire = {
            let weak = weak.clone();
            move || {
                if let Some(collection) = upgrade(&weak) {
                    callback(&collection);
                }
            }
        };
        Binding::new(id, fire, move |id| upgrade(&weak).is_some_and(|c| c.unbind(id)))
    }

    /// Fires once per member added since the last commit. `fire` replays the
    /// callback for every current member.
    pub fn bind_add<F>(&self, callback: F) -> Binding
    where
        F: Fn(&Model) + 'static,
    {
        let id = ListenerId::next();
        let callback: Rc<dyn Fn(&Model)> = Rc::new(callback);
        self.inner.added.borrow_mut().insert(id, callback.clone());
        let weak = self.downgrade();
        let fire = {
            let weak = weak.clone();
            move || {
                if let Some(collection) = upgrade(&weak) {
                    for model in collection.models() {
                        callback(&model);
                    }
                }
            }
        };
        Binding::new(id, fire, move |id| upgrade(&weak).is_some_and(|c| c.unbind(id)))
    }

    /// Fires once per member removed since the last commit. There is nothing
    /// to replay, so `fire` does nothing.
    pub fn bind_remove<F>(&self, callback: F) -> Binding
    where
        F: Fn(&Model, &MemberKey) + 'static,
    {
        let id = ListenerId::next();
        self.inner.removed.borrow_mut().insert(id, Rc::new(callback));
        let weak = self.downgrade();
        Binding::new(id, || {}, move |id| upgrade(&weak).is_some_and(|c| c.unbind(id)))
    }

    /// Removes `id` from the collection's registries or, failing that, from
    /// the embedded model.
    pub fn unbind(&self, id: ListenerId) -> bool {
        self.inner.model_change.borrow_mut().remove(id)
            || self.inner.any_model_change.borrow_mut().remove(id)
            || self.inner.added.borrow_mut().remove(id)
            || self.inner.removed.borrow_mut().remove(id)
            || self.inner.model.unbind(id)
    }

    fn dispatch(&self) {
        let pending = self.inner.pending.take();
        if pending.order_changed {
            let listeners = self.inner.model_change.borrow().snapshot();
            for (id, callback) in listeners {
                if self.inner.model_change.borrow().contains(id) {
                    callback(self);
                }
            }
        }
        if pending.any_value_changed {
            let listeners = self.inner.any_model_change.borrow().snapshot();
            for (id, callback) in listeners {
                if self.inner.any_model_change.borrow().contains(id) {
                    callback(self);
                }
            }
            for key in self.inner.model.models_keys() {
                self.inner.model.fire_bindings_watching(&key);
            }
        }
        if !pending.added.is_empty() {
            let listeners = self.inner.added.borrow().snapshot();
            for model in &pending.added {
                for (id, callback) in &listeners {
                    if self.inner.added.borrow().contains(*id) {
                        callback(model);
                    }
                }
            }
        }
        if !pending.removed.is_empty() {
            let listeners = self.inner.removed.borrow().snapshot();
            for (model, key) in &pending.removed {
                for (id, callback) in &listeners {
                    if self.inner.removed.borrow().contains(*id) {
                        callback(model, key);
                    }
                }
            }
        }
    }

    // --- teardown --------------------------------------------------------

    /// Detaches from every member without notifying, then disposes the
    /// embedded model. Members themselves are left alive.
    pub fn dispose(&self) {
        let members = self.inner.members.take();
        for member in members {
            member.model.unbind(member.change_listener);
            member.model.unbind(member.unload_listener);
        }
        self.inner.pending.take();
        self.inner.model_change.borrow_mut().clear();
        self.inner.any_model_change.borrow_mut().clear();
        self.inner.added.borrow_mut().clear();
        self.inner.removed.borrow_mut().clear();
        self.inner.model.dispose();
    }
}

fn upgrade(weak: &Weak<CollectionInner>) -> Option<Collection> {
    weak.upgrade().map(|inner| Collection { inner })
}

fn clamp_index(index: isize, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs())
    } else {
        index.unsigned_abs().min(len)
    }
}

fn same_id(own: &Value, id: &Value) -> bool {
    match (own, id) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.as_f64().is_some_and(|n| s.parse::<f64>().is_ok_and(|parsed| parsed == n))
        }
        _ => own == id,
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("model", &self.inner.model)
            .field("len", &self.len())
            .field("sorted", &self.inner.comparator.borrow().is_some())
            .finish()
    }
}
