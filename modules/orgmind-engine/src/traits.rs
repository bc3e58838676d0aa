// Trait abstractions for the engine's external collaborators.
//
// RecordSource — bounded read of the bulk dataset.
// Capability — one text-in/structured-out call per pipeline stage.
//
// Tests swap in MockRecordSource and MockCapability (see `testing`):
// no network, no dataset on disk.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use ai_client::{AiError, Claude};
use orgmind_common::{CapabilityError, Record, Stage};

use crate::stages::prompts;

// ---------------------------------------------------------------------------
// RecordSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Read at most `limit` records from the front of the dataset at `path`.
    /// Must never hold more than `limit` records in memory.
    async fn read_first_n(&self, path: &Path, limit: usize) -> Result<Vec<Record>>;
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Capability: Send + Sync {
    /// Run `stage` on `prompt`, returning the raw structured payload.
    /// The caller validates it against the stage's declared schema.
    async fn invoke(&self, stage: Stage, prompt: &str) -> Result<serde_json::Value, CapabilityError>;
}

#[async_trait]
impl Capability for Claude {
    async fn invoke(&self, stage: Stage, prompt: &str) -> Result<serde_json::Value, CapabilityError> {
        debug!(stage = stage.as_str(), prompt_chars = prompt.len(), "Invoking capability");
        self.extract_value(prompts::system_prompt(stage), prompt, prompts::schema(stage))
            .await
            .map_err(|e| capability_error(stage, e))
    }
}

fn capability_error(stage: Stage, err: AiError) -> CapabilityError {
    if err.is_schema_violation() {
        CapabilityError::Validation {
            stage,
            message: err.to_string(),
        }
    } else {
        CapabilityError::Call {
            stage,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_violations_map_to_validation() {
        let err = capability_error(Stage::Audit, AiError::MissingStructuredOutput);
        assert!(err.is_validation());
        assert_eq!(err.stage(), Stage::Audit);

        let err = capability_error(
            Stage::Parse,
            AiError::Api {
                status: 529,
                body: "overloaded".into(),
            },
        );
        assert!(!err.is_validation());
        assert!(err.to_string().contains("overloaded"));
    }
}
