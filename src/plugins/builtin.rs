//! Built-in plugin implementation for the Harbor server.
//!
//! This module provides the built-in "demo" plugin that is registered when no
//! other plugins are configured. It serves as an example consumer of the
//! plugin API and exercises every capability kind:
//!
//! - **echo** tool: returns the input text unchanged
//! - **demo://about** resource: a short platform description
//! - **greeting** prompt: a one-message chat prompt for a named user

use serde_json::{Value, json};

use crate::plugins::builder::ToolBuilder;
use crate::plugins::host::RegistrationContext;
use crate::plugins::{
    Plugin, PluginMetadata, PromptArgument, PromptDefinition, PromptPayload, ResourceDefinition,
};
use std::sync::Arc;

/// Identifier of the built-in plugin; prefixes its tool and prompt names.
pub const BUILTIN_PLUGIN_ID: &str = "demo";

/// Built-in plugin providing basic echo functionality.
#[derive(Debug)]
pub struct EchoPlugin {
    metadata: PluginMetadata,
}

impl EchoPlugin {
    pub fn new() -> Self {
        Self {
            metadata: PluginMetadata::new(
                BUILTIN_PLUGIN_ID,
                "Demo plugin",
                env!("CARGO_PKG_VERSION"),
                "Built-in diagnostic plugin with an echo tool",
            ),
        }
    }
}

impl Default for EchoPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Plugin for EchoPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn initialize(&self, ctx: &RegistrationContext) -> anyhow::Result<()> {
        let echo = ToolBuilder::new("echo")
            .description("Returns the input text as output")
            .string_param("text", "Text to echo back", true)
            .handler(|params: Value, ctx| async move {
                let text = params.get("text").and_then(Value::as_str).unwrap_or_default();
                ctx.logger().debug(format!("echoing {} bytes", text.len()));
                Ok(Value::String(text.to_string()))
            })
            .build()?;
        ctx.register_tool(echo).await?;

        ctx.register_resource(ResourceDefinition {
            uri: "demo://about".to_string(),
            name: "About".to_string(),
            description: "Describes the demo plugin".to_string(),
            mime_type: Some("text/plain".to_string()),
            handler: Arc::new(|_ctx| {
                Box::pin(async {
                    Ok(Value::String(
                        "Built-in diagnostic plugin for the Harbor server".to_string(),
                    ))
                })
            }),
        })
        .await?;

        ctx.register_prompt(PromptDefinition {
            name: "greeting".to_string(),
            description: "Greets a user by name".to_string(),
            arguments: vec![PromptArgument {
                name: "name".to_string(),
                description: "Name of the user to greet".to_string(),
                required: Some(true),
            }],
            handler: Arc::new(|args: Value, _ctx| {
                Box::pin(async move {
                    let name = args.get("name").and_then(Value::as_str).unwrap_or("there");
                    Ok(PromptPayload {
                        messages: vec![json!({
                            "role": "user",
                            "content": {
                                "type": "text",
                                "text": format!("Say hello to {}.", name),
                            }
                        })],
                    })
                })
            }),
        })
        .await?;

        ctx.logger().info("demo plugin initialized");
        Ok(())
    }
}
