//! The server kernel: JSON-RPC method dispatch over the plugin registries.

pub mod context;
pub mod kernel;

pub use kernel::ServerKernel;
