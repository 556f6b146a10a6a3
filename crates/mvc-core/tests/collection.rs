use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

use mvc_core::{
    Collection, CollectionOptions, Filter, ListenerId, MemberKey, Model, ModelError, ModelOptions,
    Schema, SchemaRule,
};
use serde_json::{json, Map, Value};

fn attrs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn model(value: Value) -> Model {
    Model::from_attributes(attrs(value))
}

fn by_sort(a: &Model, b: &Model) -> Ordering {
    let key = |m: &Model| m.get("sort").and_then(|v| v.as_f64()).unwrap_or(0.0);
    key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal)
}

fn sorted_collection() -> Collection {
    Collection::with_options(CollectionOptions {
        comparator: Some(Rc::new(by_sort)),
        ..Default::default()
    })
    .expect("collection")
}

fn counter() -> (Rc<Cell<usize>>, impl Fn() + 'static) {
    let count = Rc::new(Cell::new(0));
    let handle = count.clone();
    (count, move || handle.set(handle.get() + 1))
}

#[test]
fn sorted_collection_orders_members_on_insert() {
    let c = sorted_collection();
    for sort in [3, 1, 2] {
        c.add(model(json!({"sort": sort}))).expect("add");
    }
    assert_eq!(c.pluck("sort"), vec![Some(json!(1)), Some(json!(2)), Some(json!(3))]);
    assert_eq!(c.at(0).and_then(|m| m.get("sort")), Some(json!(1)));
    assert_eq!(c.at(2).and_then(|m| m.get("sort")), Some(json!(3)));
}

#[test]
fn model_change_fires_only_when_rank_changes() {
    let c = sorted_collection();
    let members: Vec<Model> = [1, 2, 3].iter().map(|s| model(json!({"sort": s}))).collect();
    c.add_all(members.clone(), None, false).expect("add");

    let (reorders, bump) = counter();
    c.model_change(move |_| bump());
    let (value_changes, bump) = counter();
    c.any_model_change(move |_| bump());

    members[1].set("sort", 2.5).expect("set");
    assert_eq!(reorders.get(), 0);
    assert_eq!(value_changes.get(), 1);

    members[1].set("sort", 10).expect("set");
    assert_eq!(reorders.get(), 1);
    assert_eq!(value_changes.get(), 2);
    assert_eq!(c.at(-1), Some(members[1].clone()));
}

#[test]
fn second_sort_reports_no_reorder() {
    let c = Collection::new();
    for sort in [5, 4, 3] {
        c.add(model(json!({"sort": sort}))).expect("add");
    }
    let (reorders, bump) = counter();
    c.model_change(move |_| bump());
    let (commits, bump_commit) = counter();
    c.bind_all(move |_| bump_commit());

    c.set_comparator(by_sort, false).expect("sort");
    assert_eq!(reorders.get(), 1);
    c.sort(false).expect("sort");
    assert_eq!(reorders.get(), 1);
    assert_eq!(commits.get(), 0);
    assert_eq!(c.pluck("sort"), vec![Some(json!(3)), Some(json!(4)), Some(json!(5))]);
}

#[test]
fn adding_present_member_is_rejected() {
    let c = Collection::new();
    let m = Model::new();
    assert!(c.add(&m).expect("add"));
    assert!(!c.add(&m).expect("add"));
    assert_eq!(c.len(), 1);
}

#[test]
fn bind_remove_fires_once_per_removal() {
    let c = Collection::new();
    let with_id = model(json!({"id": 7}));
    let without_id = Model::new();
    c.add_all([with_id.clone(), without_id.clone()], None, false).expect("add");

    let removed = Rc::new(RefCell::new(Vec::new()));
    let sink = removed.clone();
    c.bind_remove(move |m, key| sink.borrow_mut().push((m.clone(), key.clone())));

    assert!(c.remove(&with_id).expect("remove"));
    assert!(!c.remove(&with_id).expect("remove"));
    assert!(c.remove(&without_id).expect("remove"));
    assert_eq!(
        *removed.borrow(),
        vec![
            (with_id.clone(), MemberKey::Id(json!(7))),
            (without_id.clone(), MemberKey::Client(without_id.client_id())),
        ]
    );
    assert!(c.is_empty());
}

#[test]
fn removed_member_is_no_longer_watched() {
    let c = Collection::new();
    let m = Model::new();
    c.add(&m).expect("add");
    c.remove(&m).expect("remove");
    let (changes, bump) = counter();
    c.any_model_change(move |_| bump());
    m.set("a", 1).expect("set");
    assert_eq!(changes.get(), 0);
}

#[test]
fn add_inserts_contiguous_run_at_index() {
    let c = Collection::new();
    let [a, b, x, y] = [0, 1, 2, 3].map(|i| model(json!({"id": i})));
    c.add_all([&a, &b], None, false).expect("add");
    c.add_all([&x, &y], Some(1), false).expect("add");
    assert_eq!(c.models(), vec![a.clone(), x.clone(), y.clone(), b.clone()]);

    let z = Model::new();
    c.add_all([&z], Some(-1), false).expect("add");
    assert_eq!(c.index_of(&z), Some(3));
    assert_eq!(c.at(-1), Some(b));
}

#[test]
fn add_builds_models_from_attributes_with_factory() {
    let c = Collection::with_options(CollectionOptions {
        factory: Some(Rc::new(|attributes: Map<String, Value>| -> Result<Model, ModelError> {
            let m = Model::from_attributes(attributes);
            m.set_silent("built", true)?;
            Ok(m)
        })),
        ..Default::default()
    })
    .expect("collection");
    c.add(attrs(json!({"id": "x"}))).expect("add");
    let first = c.new_model(attrs(json!({"id": "y"})), false).expect("new model");
    assert_eq!(c.at(0), Some(first));
    assert_eq!(c.get_by_id(&json!("x")).and_then(|m| m.get("built")), Some(json!(true)));
}

#[test]
fn bind_add_fires_per_added_member_and_replays_on_fire() {
    let c = Collection::new();
    let added = Rc::new(RefCell::new(Vec::new()));
    let sink = added.clone();
    let binding = c.bind_add(move |m| sink.borrow_mut().push(m.get("id")));

    c.add_all([model(json!({"id": 1})), model(json!({"id": 2}))], None, false).expect("add");
    assert_eq!(*added.borrow(), vec![Some(json!(1)), Some(json!(2))]);

    added.borrow_mut().clear();
    binding.fire();
    assert_eq!(added.borrow().len(), 2);
}

#[test]
fn silent_mutations_are_reported_at_next_commit() {
    let c = Collection::new();
    let a = Model::new();
    let b = Model::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let sink = log.clone();
    c.bind(["title"], move |_, _| sink.borrow_mut().push("title".to_string()));
    let sink = log.clone();
    c.model_change(move |_| sink.borrow_mut().push("order".to_string()));
    let sink = log.clone();
    c.any_model_change(move |_| sink.borrow_mut().push("value".to_string()));
    let sink = log.clone();
    c.bind_add(move |m| sink.borrow_mut().push(format!("add {}", m.client_id())));
    let sink = log.clone();
    c.bind_remove(move |m, _| sink.borrow_mut().push(format!("remove {}", m.client_id())));

    c.add_all([&a, &b], None, true).expect("add");
    c.remove_all([&a], true).expect("remove");
    assert!(log.borrow().is_empty());

    c.set("title", "list").expect("set");
    assert_eq!(
        *log.borrow(),
        vec![
            "title".to_string(),
            "order".to_string(),
            format!("add {}", a.client_id()),
            format!("add {}", b.client_id()),
            format!("remove {}", a.client_id()),
        ]
    );
}

#[test]
fn models_flagged_schema_keys_fire_on_member_change() {
    let c = Collection::with_options(CollectionOptions {
        model: ModelOptions {
            schema: Schema::new().rule("members", SchemaRule::new().models()),
            ..Default::default()
        },
        ..Default::default()
    })
    .expect("collection");
    let m = Model::new();
    c.add(&m).expect("add");
    let (fired, bump) = counter();
    c.bind(["members"], move |_, _| bump());
    m.set("a", 1).expect("set");
    assert_eq!(fired.get(), 1);
}

#[test]
fn disposed_member_leaves_collection() {
    let c = Collection::new();
    let m = model(json!({"id": "gone"}));
    c.add(&m).expect("add");
    let keys = Rc::new(RefCell::new(Vec::new()));
    let sink = keys.clone();
    c.bind_remove(move |_, key| sink.borrow_mut().push(key.clone()));
    m.dispose();
    assert!(c.is_empty());
    assert_eq!(*keys.borrow(), vec![MemberKey::Id(json!("gone"))]);
}

#[test]
fn listener_mutations_are_applied_after_pending_is_taken() {
    let c = Collection::new();
    let (removals, bump) = counter();
    c.bind_remove(move |_, _| bump());
    let handle = c.clone();
    c.bind_add(move |m| {
        handle.remove(m).expect("remove from listener");
    });
    c.add(Model::new()).expect("add");
    assert!(c.is_empty());
    assert_eq!(removals.get(), 1);
    // Drops the listener holding `handle`.
    c.dispose();
}

#[test]
fn add_and_remove_listeners_unbound_mid_dispatch_are_skipped() {
    let c = Collection::new();
    let victims: Rc<RefCell<Vec<ListenerId>>> = Rc::default();

    let targets = victims.clone();
    let collection = c.clone();
    c.bind_add(move |_| {
        for id in targets.borrow_mut().drain(..) {
            collection.unbind(id);
        }
    });
    let targets = victims.clone();
    let collection = c.clone();
    c.bind_remove(move |_, _| {
        for id in targets.borrow_mut().drain(..) {
            collection.unbind(id);
        }
    });

    let (adds, bump_add) = counter();
    let added = c.bind_add(move |_| bump_add());
    victims.borrow_mut().push(added.id());
    c.add_all([model(json!({"id": 1})), model(json!({"id": 2}))], None, false).expect("add");
    assert_eq!(adds.get(), 0);

    let (removes, bump_remove) = counter();
    let removed = c.bind_remove(move |_, _| bump_remove());
    victims.borrow_mut().push(removed.id());
    c.clear(false).expect("clear");
    assert_eq!(removes.get(), 0);

    // Drops the listeners holding `collection`.
    c.dispose();
}

#[test]
fn filters_select_members() {
    let c = Collection::new();
    let active = model(json!({"id": 1, "active": true, "name": "a"}));
    let idle = model(json!({"id": 2, "active": false}));
    let blank = model(json!({"id": 3, "active": 0, "name": null}));
    c.add_all([&active, &idle, &blank], None, false).expect("add");

    assert_eq!(c.models_where("active"), vec![active.clone()]);
    assert_eq!(
        c.models_where(Filter::by(|m| m.get("id") != Some(json!(1)))),
        vec![idle.clone(), blank.clone()]
    );
    assert_eq!(
        c.pluck_many(&["id", "name"]),
        vec![attrs(json!({"id": 1, "name": "a"})), attrs(json!({"id": 2})), attrs(json!({"id": 3}))]
    );
    assert_eq!(c.get_by_id(&json!("2")), Some(idle.clone()));

    assert!(c.keep("active", true).expect("keep"));
    assert_eq!(c.models(), vec![active.clone()]);
    assert!(c.clear_where("active", false).expect("clear"));
    assert!(c.is_empty());
}

#[test]
fn set_models_replaces_membership() {
    let c = Collection::new();
    let [a, b, d] = [1, 2, 3].map(|i| model(json!({"id": i})));
    c.add_all([&a, &b], None, false).expect("add");

    let (commits, bump) = counter();
    c.bind_add(move |_| bump());
    assert!(c.set_models(&[b.clone(), d.clone()], false).expect("set models"));
    assert_eq!(c.models(), vec![b.clone(), d.clone()]);
    assert_eq!(commits.get(), 1);
    assert!(!c.set_models(&[b, d], false).expect("set models"));

    assert!(c.clear(false).expect("clear"));
    assert!(!c.clear(false).expect("clear"));
}

#[test]
fn unbind_reaches_collection_and_model_registries() {
    let c = Collection::new();
    let own = c.bind_all(|_| {});
    let added = c.bind_add(|_| {});
    let removed = c.bind_remove(|_, _| {});
    assert!(c.unbind(removed.id()));
    assert!(added.unbind());
    assert!(c.unbind(own.id()));
    assert!(!own.unbind());
}

#[test]
fn dispose_detaches_members() {
    let c = Collection::new();
    let m = Model::new();
    c.add(&m).expect("add");
    let (changes, bump) = counter();
    c.any_model_change(move |_| bump());
    c.dispose();
    assert!(c.is_empty());
    m.set("a", 1).expect("set");
    assert_eq!(changes.get(), 0);
    assert!(!m.is_disposed());
}
