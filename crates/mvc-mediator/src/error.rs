use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediatorError {
    #[error("invalid mediator config: {0}")]
    InvalidConfig(String),
}
