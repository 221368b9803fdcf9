pub mod format;
pub mod server;
pub mod tools;

pub use server::{McpServer, run_mcp_server};
