pub mod models;
pub mod error;
pub mod config;
pub mod inputs;
pub mod expander;
pub mod retry;
pub mod engine;
pub mod executor;
pub mod dispatcher;
pub mod reporting;

// Re-export commonly used items
pub use models::*;
pub use error::*;
pub use config::*;
pub use inputs::*;
pub use expander::*;
pub use retry::*;
pub use engine::*;
pub use executor::*;
pub use dispatcher::*;
pub use reporting::*;
