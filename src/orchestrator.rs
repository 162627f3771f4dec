use std::marker::PhantomData;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::ai::client::{ModelClient, ModelRequest};
use crate::ai::schema_utils;
use crate::core::dsl::{Marker, Template};
use crate::core::runtime;
use crate::core::schema::{Constraint, FieldKind, RecordSchema};
use crate::error::{DefinitionError, FlowError, ModelError, RenderError, SchemaError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A named prompt with its input and output contracts. Built once at startup
/// and read-only afterwards.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    name: String,
    input_schema: RecordSchema,
    output_schema: RecordSchema,
    template: Template,
    response_schema: Value,
}

impl FlowDefinition {
    /// Parses the template and checks every marker against the input schema.
    pub fn new(
        name: impl Into<String>,
        input_schema: RecordSchema,
        output_schema: RecordSchema,
        template: &str,
    ) -> Result<Self, DefinitionError> {
        let template = Template::parse(template)?;
        check_references(&template, &input_schema)?;
        let response_schema = schema_utils::response_schema(&output_schema);

        Ok(Self {
            name: name.into(),
            input_schema,
            output_schema,
            template,
            response_schema,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_schema(&self) -> &RecordSchema {
        &self.input_schema
    }

    pub fn output_schema(&self) -> &RecordSchema {
        &self.output_schema
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// The output hint handed to the model.
    pub fn response_schema(&self) -> &Value {
        &self.response_schema
    }

    /// Input contract rendered the same way as the output hint.
    pub fn input_hint(&self) -> Value {
        schema_utils::response_schema(&self.input_schema)
    }
}

fn check_references(template: &Template, schema: &RecordSchema) -> Result<(), DefinitionError> {
    for reference in template.references() {
        let field = schema
            .field(&reference.field)
            .ok_or_else(|| DefinitionError::UnknownField {
                field: reference.field.clone(),
                marker: reference.marker.label(),
            })?;

        let (fits, expected) = match reference.marker {
            Marker::Scalar => (field.kind.is_scalar(), "a string or boolean"),
            Marker::Each => (field.kind == FieldKind::StringList, "an array of strings"),
            Marker::If => (field.kind == FieldKind::Boolean, "a boolean"),
            Marker::Media => (
                field.kind == FieldKind::String && field.has_constraint(Constraint::DataUri),
                "a data URI string",
            ),
        };
        if !fits {
            return Err(DefinitionError::KindMismatch {
                field: reference.field,
                marker: reference.marker.label(),
                expected,
                found: field.kind.label(),
            });
        }
    }
    Ok(())
}

/// A flow definition bound to the Rust types of its records.
#[derive(Debug, Clone)]
pub struct Flow<I, O> {
    definition: FlowDefinition,
    _records: PhantomData<fn(I) -> O>,
}

impl<I, O> Flow<I, O> {
    pub fn new(definition: FlowDefinition) -> Self {
        Self {
            definition,
            _records: PhantomData,
        }
    }

    pub fn definition(&self) -> &FlowDefinition {
        &self.definition
    }
}

/// Runs flows: validate input, render, invoke, validate output, return.
/// Each run is independent; the orchestrator holds no per-call state.
pub struct Orchestrator<C> {
    client: C,
    timeout: Duration,
}

impl<C: ModelClient> Orchestrator<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Upper bound on the whole model call, retries included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub async fn run(&self, flow: &FlowDefinition, input: Value) -> Result<Value, FlowError> {
        let invocation = Uuid::new_v4();
        let name = flow.name();
        log::info!("▶️  [{invocation}] Running flow '{name}'");

        let invalid_input = |source: SchemaError| {
            log::warn!("   [{invocation}] Input rejected: {source}");
            FlowError::InvalidInput {
                flow: name.to_string(),
                source,
            }
        };

        let record = flow.input_schema().validate(&input).map_err(invalid_input)?;

        let prompt = runtime::render(flow.template(), record).map_err(|e| {
            let RenderError::Media { field, source } = e;
            invalid_input(SchemaError::Constraint {
                field,
                reason: source.to_string(),
            })
        })?;
        log::debug!("   [{invocation}] Prompt:\n{}", prompt.text());

        let request = ModelRequest {
            flow: name.to_string(),
            prompt,
            response_schema: flow.response_schema().clone(),
        };

        let raw = tokio::time::timeout(self.timeout, self.client.generate(request))
            .await
            .unwrap_or(Err(ModelError::Timeout(self.timeout)))
            .map_err(|source| {
                log::warn!("   [{invocation}] Model call failed: {source}");
                FlowError::ModelInvocationFailed {
                    flow: name.to_string(),
                    source,
                }
            })?;

        if let Err(source) = flow.output_schema().validate(&raw) {
            log::warn!("   [{invocation}] Model output rejected: {source}");
            return Err(FlowError::InvalidModelOutput {
                flow: name.to_string(),
                source,
            });
        }

        log::info!("✅ [{invocation}] Flow '{name}' completed");
        Ok(raw)
    }

    /// Typed wrapper around [`Orchestrator::run`].
    pub async fn run_typed<I, O>(&self, flow: &Flow<I, O>, input: &I) -> Result<O, FlowError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let definition = flow.definition();
        let input = serde_json::to_value(input).map_err(|e| FlowError::InvalidInput {
            flow: definition.name().to_string(),
            source: SchemaError::Undecodable(e.to_string()),
        })?;

        let output = self.run(definition, input).await?;
        serde_json::from_value(output).map_err(|e| FlowError::InvalidModelOutput {
            flow: definition.name().to_string(),
            source: SchemaError::Undecodable(e.to_string()),
        })
    }
}
