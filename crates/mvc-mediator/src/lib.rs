//! Hierarchical publish/subscribe.
//!
//! Message keys are split into levels by a separator (`.` by default).
//! Listeners subscribe with patterns that may contain a wildcard (`*`, any
//! run of characters) or a level wildcard (`%`, any run within one level).
//! Broadcasters register the keys they may emit, which drives the optional
//! init and dispose hooks of matching listeners.
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use serde_json::json;
//! use mvc_mediator::Mediator;
//!
//! let mediator = Mediator::new();
//! let hits = Rc::new(Cell::new(0));
//! let counter = hits.clone();
//! mediator.on("user.*", move |args, message| {
//!     assert_eq!(message, "user.login");
//!     assert_eq!(args, Some(&json!({"name": "ada"})));
//!     counter.set(counter.get() + 1);
//! });
//! mediator.broadcast("user.login", Some(&json!({"name": "ada"})));
//! mediator.broadcast("system.boot", None);
//! assert_eq!(hits.get(), 1);
//! ```

pub mod config;
pub mod error;
pub mod mediator;
pub mod pattern;

pub use config::MediatorConfig;
pub use error::MediatorError;
pub use mediator::{
    Broadcaster, BroadcasterRef, DisposeFn, InitFn, Listener, ListenerId, ListenerState, Mediator,
    MessageFn,
};
