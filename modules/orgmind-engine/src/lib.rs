pub mod engine;
pub mod pipeline;
pub mod queue;
pub mod run_log;
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod stages;
pub mod stats;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use engine::{Engine, EngineDeps};
pub use scheduler::TickOutcome;
pub use source::JsonlSource;
