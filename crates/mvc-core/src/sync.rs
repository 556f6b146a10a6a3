//! Persistence boundary. A [`ModelSync`] is handed the model being saved,
//! fetched or deleted together with an optional completion callback; how and
//! when it calls back is up to the implementation.

use crate::model::Model;

pub type SyncCallback = Box<dyn FnOnce(&Model)>;

pub trait ModelSync {
    fn create(&self, model: &Model, callback: Option<SyncCallback>);
    fn read(&self, model: &Model, callback: Option<SyncCallback>);
    fn update(&self, model: &Model, callback: Option<SyncCallback>);
    fn delete(&self, model: &Model, callback: Option<SyncCallback>);
}
