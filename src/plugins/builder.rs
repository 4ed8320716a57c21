//! Fluent builder producing [`ToolDefinition`] records.
//!
//! Parameter kinds are a tagged union rather than free-form schema maps, so
//! the builder can render a well-formed JSON-Schema object and the registry
//! can check `required` against declared properties. A tool cannot be built
//! without a handler.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::errors::RegistrationError;
use crate::plugins::{InputSchema, ToolDefinition, ToolHandler};
use crate::server::context::CallContext;

/// The kinds of parameter a tool can declare.
#[derive(Debug, Clone)]
pub enum ParamKind {
    String,
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
    Enum(Vec<String>),
    Array,
    Object,
}

#[derive(Debug, Clone)]
struct ParamSpec {
    name: String,
    description: String,
    required: bool,
    kind: ParamKind,
}

impl ParamSpec {
    fn render(&self) -> Value {
        let mut schema = Map::new();
        schema.insert(
            "description".to_string(),
            Value::String(self.description.clone()),
        );
        match &self.kind {
            ParamKind::String => {
                schema.insert("type".to_string(), json!("string"));
            }
            ParamKind::Number { min, max } => {
                schema.insert("type".to_string(), json!("number"));
                if let Some(min) = min {
                    schema.insert("minimum".to_string(), json!(min));
                }
                if let Some(max) = max {
                    schema.insert("maximum".to_string(), json!(max));
                }
            }
            ParamKind::Boolean => {
                schema.insert("type".to_string(), json!("boolean"));
            }
            ParamKind::Enum(values) => {
                schema.insert("type".to_string(), json!("string"));
                schema.insert("enum".to_string(), json!(values));
            }
            ParamKind::Array => {
                schema.insert("type".to_string(), json!("array"));
            }
            ParamKind::Object => {
                schema.insert("type".to_string(), json!("object"));
            }
        }
        Value::Object(schema)
    }
}

/// Builds a [`ToolDefinition`] from a sequence of parameter descriptions
/// plus a handler.
///
/// ```ignore
/// let tool = ToolBuilder::new("echo")
///     .description("Returns the input text unchanged")
///     .string_param("text", "Text to echo back", true)
///     .handler(|params, _ctx| async move {
///         Ok(params.get("text").cloned().unwrap_or(Value::Null))
///     })
///     .build()?;
/// ```
pub struct ToolBuilder {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    handler: Option<ToolHandler>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            params: Vec::new(),
            handler: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn param(mut self, name: &str, description: &str, required: bool, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            description: description.to_string(),
            required,
            kind,
        });
        self
    }

    pub fn string_param(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, description, required, ParamKind::String)
    }

    pub fn number_param(
        self,
        name: &str,
        description: &str,
        required: bool,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        self.param(name, description, required, ParamKind::Number { min, max })
    }

    pub fn bool_param(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, description, required, ParamKind::Boolean)
    }

    pub fn enum_param(
        self,
        name: &str,
        description: &str,
        required: bool,
        values: &[&str],
    ) -> Self {
        self.param(
            name,
            description,
            required,
            ParamKind::Enum(values.iter().map(|s| s.to_string()).collect()),
        )
    }

    pub fn array_param(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, description, required, ParamKind::Array)
    }

    pub fn object_param(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, description, required, ParamKind::Object)
    }

    /// Sets the async handler invoked by `tools/call`.
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |params, ctx| {
            Box::pin(handler(params, ctx))
        }));
        self
    }

    /// Produces the tool record.
    ///
    /// # Errors
    /// `MissingHandler` when no handler was set.
    pub fn build(self) -> Result<ToolDefinition, RegistrationError> {
        let handler = self
            .handler
            .ok_or_else(|| RegistrationError::MissingHandler(self.name.clone()))?;

        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(param.name.clone(), param.render());
            if param.required {
                required.push(param.name.clone());
            }
        }

        Ok(ToolDefinition {
            name: self.name,
            description: self.description,
            input_schema: InputSchema {
                schema_type: "object".to_string(),
                properties,
                required,
                additional_properties: false,
            },
            handler,
        })
    }
}
