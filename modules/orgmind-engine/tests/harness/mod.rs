//! Shared setup for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use orgmind_common::{EngineConfig, Record, RunStatus};
use orgmind_engine::testing::{MockCapability, MockRecordSource};
use orgmind_engine::{Engine, EngineDeps};

pub struct Harness {
    pub engine: Arc<Engine>,
    pub capability: Arc<MockCapability>,
    pub source: Arc<MockRecordSource>,
}

pub fn config(batch_size: usize) -> EngineConfig {
    EngineConfig {
        source_path: "fixtures/messages.jsonl".into(),
        record_limit: 100,
        batch_interval: Duration::from_secs(15),
        batch_size,
        stage_timeout: None,
    }
}

impl Harness {
    pub fn new(records: Vec<Record>, capability: MockCapability, config: EngineConfig) -> Self {
        Self::with_source(MockRecordSource::new(records), capability, config)
    }

    pub fn with_source(
        source: MockRecordSource,
        capability: MockCapability,
        config: EngineConfig,
    ) -> Self {
        let capability = Arc::new(capability);
        let source = Arc::new(source);
        let engine = Engine::new(
            EngineDeps::builder()
                .config(config)
                .source(source.clone())
                .capability(capability.clone())
                .build(),
        );
        Self {
            engine,
            capability,
            source,
        }
    }

    /// Let virtual time run until the run leaves `running`.
    /// Checks the queued/processed invariant at every observation.
    pub async fn run_to_end(&self, loaded: usize) -> RunStatus {
        for _ in 0..1_000 {
            let status = self.engine.status().await;
            assert_eq!(status.loaded(), loaded, "queued + processed drifted: {status:?}");
            if !status.is_running() {
                return status;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("run did not finish");
    }
}
