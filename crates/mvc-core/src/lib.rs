//! Reactive data layer: schema-driven attribute models, ordered observable
//! collections of models, a persistence callback boundary and an id-keyed
//! model cache.
//!
//! Everything here is single-threaded. Handles ([`Model`], [`Collection`],
//! [`Store`]) are reference counted and cheap to clone; listeners are plain
//! closures registered under a [`ListenerId`].
//!
//! ```
//! use serde_json::json;
//! use mvc_core::Model;
//!
//! let model = Model::new();
//! let binding = model.bind(["name"], |values, _| {
//!     assert_eq!(values[0], Some(json!("Ada")));
//! });
//! model.set("name", "Ada").unwrap();
//! binding.unbind();
//! ```

mod attributes;
pub mod collection;
pub mod compare;
pub mod error;
pub mod listener;
pub mod model;
pub mod schema;
pub mod sort;
pub mod store;
pub mod sync;

pub use attributes::is_truthy;
pub use collection::{
    AddItem, Collection, CollectionOptions, Comparator, Filter, MemberKey, ModelFactory,
};
pub use error::{BoxError, ModelError, RuleError, ValidationError};
pub use listener::{Binding, ListenerId};
pub use model::{Binder, ClientId, ErrorHandler, Model, ModelOptions};
pub use schema::{Getter, Schema, SchemaRule, Setter, ValueKind};
pub use store::Store;
pub use sync::{ModelSync, SyncCallback};
