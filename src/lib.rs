//! Harbor: an MCP server platform with plugin hosting and workflow
//! orchestration.
//!
//! The crate is organized the way requests flow:
//!
//! - [`transport`] accepts connections and frames JSON-RPC 2.0 messages
//! - [`protocol`] defines the envelopes and the normalized request form
//! - [`server`] dispatches methods over the registries and builds per-call
//!   contexts
//! - [`plugins`] owns plugin lifecycle and the tool/resource/prompt
//!   registries
//! - [`middleware`] wraps every tool invocation in pre/post/error hooks
//! - [`orchestrator`] tracks sessions and switches workflows on intent

pub mod config;
pub mod errors;
pub mod middleware;
pub mod orchestrator;
pub mod plugins;
pub mod protocol;
pub mod server;
pub mod state;
pub mod transport;
