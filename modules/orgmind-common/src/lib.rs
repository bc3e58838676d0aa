pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, EngineConfig};
pub use error::{CapabilityError, EngineError};
pub use types::*;
