use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// JSON kind of a value as observed during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ValueKind::Null,
            serde_json::Value::Bool(_) => ValueKind::Boolean,
            serde_json::Value::Number(_) => ValueKind::Number,
            serde_json::Value::String(_) => ValueKind::String,
            serde_json::Value::Array(_) => ValueKind::Array,
            serde_json::Value::Object(_) => ValueKind::Object,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// A record failed its declared shape. Reports the first failing field only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("expected a record, found {found}")]
    NotARecord { found: ValueKind },

    #[error("field '{field}' is required ({expected})")]
    Missing { field: String, expected: &'static str },

    #[error("field '{field}': expected {expected}, found {found}")]
    WrongKind {
        field: String,
        expected: &'static str,
        found: ValueKind,
    },

    #[error("field '{field}': {reason}")]
    Constraint { field: String, reason: String },

    #[error("record could not be decoded: {0}")]
    Undecodable(String),
}

impl SchemaError {
    /// Path of the failing field, when the error is tied to one.
    pub fn field(&self) -> Option<&str> {
        match self {
            SchemaError::Missing { field, .. }
            | SchemaError::WrongKind { field, .. }
            | SchemaError::Constraint { field, .. } => Some(field),
            SchemaError::NotARecord { .. } | SchemaError::Undecodable(_) => None,
        }
    }
}

/// Syntax errors in a prompt template. Offsets are byte offsets into the source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated tag starting at offset {offset}")]
    Unterminated { offset: usize },

    #[error("unknown tag '{tag}' at offset {offset}")]
    UnknownTag { tag: String, offset: usize },

    #[error("invalid field name '{name}' at offset {offset}")]
    InvalidFieldName { name: String, offset: usize },

    #[error("unexpected '{{{{/{found}}}}}' at offset {offset}: no open block")]
    UnexpectedClose { found: String, offset: usize },

    #[error("'{{{{/{found}}}}}' at offset {offset} closes a '{expected}' block")]
    MismatchedClose {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("'{block}' block opened at offset {offset} is never closed")]
    Unclosed { block: String, offset: usize },

    #[error("'else' at offset {offset} outside of an 'if' block")]
    StrayElse { offset: usize },

    #[error("'this' at offset {offset} used outside of an 'each' block")]
    ThisOutsideEach { offset: usize },
}

/// A flow could not be defined. Raised once at startup, never per call.
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Template Error: {0}")]
    Template(#[from] TemplateError),

    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),

    #[error("'{marker}' marker references undeclared field '{field}'")]
    UnknownField { field: String, marker: &'static str },

    #[error("'{marker}' marker on field '{field}' needs {expected}, but the field is {found}")]
    KindMismatch {
        field: String,
        marker: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("constraint '{constraint}' does not apply to field '{field}' of kind {kind}")]
    ConstraintMismatch {
        field: String,
        constraint: &'static str,
        kind: &'static str,
    },

    #[error("unsupported schema for field '{field}': {detail}")]
    UnsupportedSchema { field: String, detail: String },

    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A `data:` URI failed structural checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataUriError {
    #[error("must start with 'data:'")]
    MissingScheme,

    #[error("must declare a MIME type of the form 'type/subtype'")]
    MissingMimeType,

    #[error("must use ';base64,' encoding")]
    NotBase64,

    #[error("payload is empty")]
    EmptyPayload,

    #[error("payload is not valid base64: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("media field '{field}' does not hold a data URI: {source}")]
    Media {
        field: String,
        #[source]
        source: DataUriError,
    },
}

/// Transport or service level failure of the model call.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("API Error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("model refused the request: {0}")]
    Refused(String),

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
}

impl ModelError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ModelError::Status { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            ModelError::Timeout(_) => true,
            ModelError::Malformed(_) | ModelError::Refused(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowErrorKind {
    InvalidInput,
    ModelInvocationFailed,
    InvalidModelOutput,
    UnknownFlow,
}

impl FlowErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowErrorKind::InvalidInput => "invalid_input",
            FlowErrorKind::ModelInvocationFailed => "model_invocation_failed",
            FlowErrorKind::InvalidModelOutput => "invalid_model_output",
            FlowErrorKind::UnknownFlow => "unknown_flow",
        }
    }
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("invalid input for flow '{flow}': {source}")]
    InvalidInput { flow: String, source: SchemaError },

    #[error("model invocation failed for flow '{flow}': {source}")]
    ModelInvocationFailed { flow: String, source: ModelError },

    #[error("model output for flow '{flow}' violates its contract: {source}")]
    InvalidModelOutput { flow: String, source: SchemaError },

    #[error("unknown flow '{0}'")]
    UnknownFlow(String),
}

impl FlowError {
    pub fn kind(&self) -> FlowErrorKind {
        match self {
            FlowError::InvalidInput { .. } => FlowErrorKind::InvalidInput,
            FlowError::ModelInvocationFailed { .. } => FlowErrorKind::ModelInvocationFailed,
            FlowError::InvalidModelOutput { .. } => FlowErrorKind::InvalidModelOutput,
            FlowError::UnknownFlow(_) => FlowErrorKind::UnknownFlow,
        }
    }

    /// Only transport failures are worth retrying from the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FlowError::ModelInvocationFailed { .. })
    }

    /// Failing field for schema errors on either side of the model call.
    pub fn field(&self) -> Option<&str> {
        match self {
            FlowError::InvalidInput { source, .. }
            | FlowError::InvalidModelOutput { source, .. } => source.field(),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY must be set to call the model service")]
    MissingApiKey,
}
