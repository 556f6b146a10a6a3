//! Per-key schema rules: derived getters, transforming or validating setters,
//! custom compare predicates, and the collection `models` flag.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use regex::Regex;
use serde_json::Value;

use crate::compare::CompareFn;
use crate::error::RuleError;
use crate::model::Model;

/// Derives a value from the resolved values of the rule's required keys.
pub type Getter = Rc<dyn Fn(&[Option<Value>]) -> Option<Value>>;

/// Transforms or validates an incoming value before it is stored. Receives
/// the model being written and whether the write is silent.
pub type Setter = Rc<dyn Fn(&Model, Option<Value>, bool) -> Result<Option<Value>, RuleError>>;

#[derive(Clone, Default)]
pub struct SchemaRule {
    pub(crate) getter: Option<Getter>,
    pub(crate) require: Vec<String>,
    pub(crate) setter: Option<Setter>,
    pub(crate) compare: Option<CompareFn>,
    pub(crate) models: bool,
}

impl SchemaRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a getter over `require`. Listing the rule's own key among the
    /// requirements reads that key's raw stored value.
    pub fn get<I, S, F>(mut self, require: I, getter: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[Option<Value>]) -> Option<Value> + 'static,
    {
        self.require = require.into_iter().map(Into::into).collect();
        self.getter = Some(Rc::new(getter));
        self
    }

    pub fn set<F>(mut self, setter: F) -> Self
    where
        F: Fn(Option<Value>) -> Result<Option<Value>, RuleError> + 'static,
    {
        self.setter = Some(Rc::new(move |_: &Model, value: Option<Value>, _: bool| setter(value)));
        self
    }

    /// Like [`SchemaRule::set`] with access to the model and the silent flag.
    pub fn set_with<F>(mut self, setter: F) -> Self
    where
        F: Fn(&Model, Option<Value>, bool) -> Result<Option<Value>, RuleError> + 'static,
    {
        self.setter = Some(Rc::new(setter));
        self
    }

    pub fn compare<F>(mut self, compare: F) -> Self
    where
        F: Fn(Option<&Value>, Option<&Value>) -> bool + 'static,
    {
        self.compare = Some(Rc::new(compare));
        self
    }

    /// Marks the key as depending on collection members: its bindings fire
    /// whenever any member of the owning collection changes.
    pub fn models(mut self) -> Self {
        self.models = true;
        self
    }

    /// Validator accepting only values of `kind`.
    pub fn kind(kind: ValueKind) -> Self {
        Self::new().set(move |value| {
            if kind.matches(value.as_ref()) {
                Ok(value)
            } else {
                Err(RuleError::invalid(format!("value not {}", kind.describe())))
            }
        })
    }

    /// Validator accepting only values whose text matches `pattern`.
    pub fn pattern(pattern: Regex) -> Self {
        Self::new().set(move |value| {
            let matched = match &value {
                Some(Value::String(text)) => pattern.is_match(text),
                Some(other) => pattern.is_match(&other.to_string()),
                None => false,
            };
            if matched {
                Ok(value)
            } else {
                Err(RuleError::invalid(format!(
                    "value does not match pattern `{}`",
                    pattern.as_str()
                )))
            }
        })
    }

    pub fn requires(&self) -> &[String] {
        &self.require
    }

    pub fn has_getter(&self) -> bool {
        self.getter.is_some()
    }

    pub fn has_setter(&self) -> bool {
        self.setter.is_some()
    }

    pub fn has_compare(&self) -> bool {
        self.compare.is_some()
    }

    pub fn is_models(&self) -> bool {
        self.models
    }

    /// Overwrites the fields `other` defines, keeping the rest.
    pub(crate) fn merge(&mut self, other: SchemaRule) {
        if other.getter.is_some() {
            self.getter = other.getter;
            self.require = other.require;
        }
        if other.setter.is_some() {
            self.setter = other.setter;
        }
        if other.compare.is_some() {
            self.compare = other.compare;
        }
        self.models |= other.models;
    }
}

impl fmt::Debug for SchemaRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRule")
            .field("require", &self.require)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("compare", &self.compare.is_some())
            .field("models", &self.models)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    String,
    Array,
}

impl ValueKind {
    pub fn matches(self, value: Option<&Value>) -> bool {
        matches!(
            (self, value),
            (Self::Number, Some(Value::Number(_)))
                | (Self::String, Some(Value::String(_)))
                | (Self::Array, Some(Value::Array(_)))
        )
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Number => "a number",
            Self::String => "a string",
            Self::Array => "an array",
        }
    }
}

/// Rules keyed by attribute name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    rules: BTreeMap<String, SchemaRule>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, key: impl Into<String>, rule: SchemaRule) -> Self {
        self.insert(key, rule);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, rule: SchemaRule) {
        self.rules.insert(key.into(), rule);
    }

    pub fn get(&self, key: &str) -> Option<&SchemaRule> {
        self.rules.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.rules.keys()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub(crate) fn entry(&mut self, key: &str) -> &mut SchemaRule {
        self.rules.entry(key.to_owned()).or_default()
    }

    pub(crate) fn merge(&mut self, other: Schema) {
        for (key, rule) in other.rules {
            self.entry(&key).merge(rule);
        }
    }

    pub(crate) fn models_keys(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter(|(_, rule)| rule.models)
            .map(|(key, _)| key.clone())
            .collect()
    }
}
