//! Id-keyed cache of models.
//!
//! A model created without an id is cached under its client id until it
//! gains an `id` attribute, at which point it is re-keyed.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::trace;

use crate::collection::{default_factory, ModelFactory};
use crate::error::ModelError;
use crate::listener::ListenerId;
use crate::model::Model;

#[derive(Clone)]
pub struct Store {
    cache: Rc<RefCell<HashMap<String, Model>>>,
    factory: ModelFactory,
}

impl Store {
    pub fn new() -> Self {
        Self::with_factory(default_factory())
    }

    pub fn with_factory(factory: ModelFactory) -> Self {
        Self {
            cache: Rc::default(),
            factory,
        }
    }

    /// Returns the model cached under `id`, creating (and caching) one when
    /// there is none.
    pub fn get(&self, id: Option<&Value>) -> Result<Model, ModelError> {
        if let Some(id) = id {
            if let Some(model) = self.cache.borrow().get(&cache_key(id)) {
                return Ok(model.clone());
            }
        }
        let model = (self.factory)(Map::new())?;
        match id {
            Some(id) => {
                model.set_silent("id", id.clone())?;
                self.cache.borrow_mut().insert(cache_key(id), model.clone());
            }
            None => {
                let client_key = model.client_id().to_string();
                self.cache.borrow_mut().insert(client_key.clone(), model.clone());
                self.rekey_on_id(&model, client_key);
            }
        }
        Ok(model)
    }

    fn rekey_on_id(&self, model: &Model, client_key: String) {
        let cache = Rc::downgrade(&self.cache);
        let slot: Rc<Cell<Option<ListenerId>>> = Rc::default();
        let own_id = slot.clone();
        let binding = model.bind_all(move |model| {
            let Some(id) = model.get("id") else {
                return;
            };
            if let Some(cache) = cache.upgrade() {
                let mut cache = cache.borrow_mut();
                cache.remove(&client_key);
                let key = cache_key(&id);
                trace!(from = %client_key, to = %key, "re-keying cached model");
                cache.insert(key, model.clone());
            }
            if let Some(listener) = own_id.take() {
                model.unbind(listener);
            }
        });
        slot.set(Some(binding.id()));
    }

    /// Seeds the cache; models without an id are keyed by client id.
    pub fn insert<I>(&self, models: I)
    where
        I: IntoIterator<Item = Model>,
    {
        let mut cache = self.cache.borrow_mut();
        for model in models {
            let key = match model.get("id") {
                Some(id) => cache_key(&id),
                None => model.client_id().to_string(),
            };
            cache.insert(key, model);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cache_key(id: &Value) -> String {
    match id {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("len", &self.len()).finish()
    }
}
