pub mod buffer;
pub mod categorizer;
pub mod classifier;
pub mod config;
pub mod conversation;
pub mod embed;
pub mod error;
pub mod filter;
pub mod language;
pub mod models;
pub mod project;
pub mod scanner;
pub mod service;
pub mod store;
pub mod sync;
pub mod tagging;
pub mod utils;

pub use buffer::*;
pub use categorizer::*;
pub use classifier::*;
pub use config::*;
pub use conversation::*;
pub use embed::*;
pub use error::*;
pub use filter::*;
pub use models::*;
pub use project::*;
pub use scanner::*;
pub use service::*;
pub use store::*;
pub use sync::*;
pub use tagging::*;
pub use utils::*;
