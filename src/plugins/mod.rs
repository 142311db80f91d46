//! Plugin surface for querygate
//!
//! Exposes the query tool to a host daemon. The host and this process
//! exchange line-delimited JSON over stdin/stdout.

mod host;
mod protocol;
mod tools;

pub use host::PluginHost;
pub use tools::Toolbox;
