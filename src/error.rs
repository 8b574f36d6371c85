//! Error types for the REST API provider.

use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors that can occur while serving a lifecycle call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider has not been configured, or was configured twice.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The provider handle handed to a resource is not the expected record.
    #[error("Unexpected Resource Configure Type: {0}")]
    ConfigureType(String),

    /// Host-supplied values failed schema validation.
    #[error("Validation error: {} diagnostic(s)", .0.len())]
    Validation(Vec<Diagnostic>),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The outbound request could not be built.
    #[error("error creating request: {0}")]
    Request(String),

    /// The HTTP client failed to deliver the request.
    #[error("error sending request: {0}")]
    Http(#[from] reqwest::Error),

    /// The REST endpoint answered outside the 2xx range.
    #[error("error sending request: status code: {status} body: {body}")]
    Status {
        /// Status line, e.g. `500 Internal Server Error`.
        status: String,
        /// Response body as received.
        body: String,
    },

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
}

impl ProviderError {
    /// Convert the error into host diagnostics.
    ///
    /// Validation errors expand into the diagnostics they carry; every other
    /// variant becomes exactly one error diagnostic whose summary names the
    /// failing stage and whose detail carries the underlying message.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        match self {
            Self::Validation(diagnostics) => diagnostics,
            Self::Request(msg) => vec![Diagnostic::error("error creating request").with_detail(msg)],
            Self::Http(err) => {
                vec![Diagnostic::error("error sending request").with_detail(err.to_string())]
            },
            Self::Status { status, body } => vec![Diagnostic::error("error sending request")
                .with_detail(format!("status code: {} body: {}", status, body))],
            Self::ConfigureType(msg) => {
                vec![Diagnostic::error("Unexpected Resource Configure Type").with_detail(msg)]
            },
            other => vec![Diagnostic::error(other.to_string())],
        }
    }
}
