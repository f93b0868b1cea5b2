use crate::models::{QueryExecutionId, QueryOperation};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    InvalidArgument,
    NotFound,
    MissingField,
    Transport,
    Service,
    ParseFailure,
    Timeout,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub operation: Option<QueryOperation>,
    pub execution_id: Option<QueryExecutionId>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation: None,
            execution_id: None,
            kind,
            message: message.into(),
        }
    }

    pub fn operation(mut self, operation: QueryOperation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn execution_id(mut self, execution_id: &QueryExecutionId) -> Self {
        self.execution_id = Some(execution_id.clone());
        self
    }

    /// Fills in the operation and execution id when the source left them unset.
    /// Kind and message are never rewritten.
    pub fn attribute(
        self,
        operation: QueryOperation,
        execution_id: Option<&QueryExecutionId>,
    ) -> Self {
        Self {
            operation: self.operation.or(Some(operation)),
            execution_id: self.execution_id.or_else(|| execution_id.cloned()),
            kind: self.kind,
            message: self.message,
        }
    }
}
