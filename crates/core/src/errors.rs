use thiserror::Error;

/// A failed call to an external collaborator (board tool, HTTP endpoint).
///
/// Every variant carries the operation context so the log line says what was
/// being attempted, not only what went wrong.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{context}: request failed: {message}")]
    Request { context: String, message: String },
    #[error("{context}: unexpected response status {status}")]
    Status { context: String, status: u16 },
    #[error("{context}: malformed response: {message}")]
    Malformed { context: String, message: String },
}

impl CollaboratorError {
    pub fn request(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Request { context: context.into(), message: message.to_string() }
    }

    pub fn status(context: impl Into<String>, status: u16) -> Self {
        Self::Status { context: context.into(), status }
    }

    pub fn malformed(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Malformed { context: context.into(), message: message.to_string() }
    }

    pub fn context(&self) -> &str {
        match self {
            Self::Request { context, .. }
            | Self::Status { context, .. }
            | Self::Malformed { context, .. } => context,
        }
    }

    /// Stable class name for the `error_class` log field.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Request { .. } => "collaborator_request",
            Self::Status { .. } => "collaborator_status",
            Self::Malformed { .. } => "collaborator_malformed",
        }
    }
}
