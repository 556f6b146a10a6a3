use thiserror::Error;

/// Boxed failure carried by [`RuleError::Failed`] and [`ModelError::Rule`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A value was refused by a schema setter.
///
/// Validation errors never escape `set`: they are routed to the model's error
/// handler and the offending key is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Outcome of a failing schema setter.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Failed(#[source] BoxError),
}

impl RuleError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(message))
    }

    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }
}

impl From<ModelError> for RuleError {
    fn from(err: ModelError) -> Self {
        Self::Failed(Box::new(err))
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("schema rule for `{key}` failed: {source}")]
    Rule {
        key: String,
        #[source]
        source: BoxError,
    },
    #[error("model has no sync configured")]
    NoSync,
}
