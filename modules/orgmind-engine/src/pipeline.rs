//! Per-batch extraction pipeline.
//!
//! parse (per record, sequential) → route → selected analysts (concurrent)
//! → audit (if routed) → synthesis. Any stage failure aborts the batch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use orgmind_common::{CapabilityError, Record, Recommendations, Stage};

use crate::stages::prompts::{self, MemoryContext};
use crate::stages::{
    Agent, AuditReport, KnowledgeAnalysis, MemoryAnalysis, ParsedMessage, RoutingDecision,
    Selection, StageOutput, StakeholderAnalysis,
};
use crate::traits::Capability;

/// One slice of the queue plus the index state it is analysed against.
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub seq: usize,
    pub records: Vec<Record>,
    pub memory_context: MemoryContext,
}

/// Everything a completed pipeline produced. Unselected stages hold their empty default.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub seq: usize,
    pub record_count: usize,
    pub parsed: Vec<ParsedMessage>,
    pub routing: RoutingDecision,
    pub selection: Selection,
    pub knowledge: KnowledgeAnalysis,
    pub stakeholders: StakeholderAnalysis,
    pub memory: MemoryAnalysis,
    pub audit: AuditReport,
    pub recommendations: Recommendations,
    /// Wall time of every stage that ran.
    pub stage_millis: BTreeMap<Stage, u64>,
}

#[derive(Clone)]
pub struct Pipeline {
    capability: Arc<dyn Capability>,
    stage_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(capability: Arc<dyn Capability>, stage_timeout: Option<Duration>) -> Self {
        Self {
            capability,
            stage_timeout,
        }
    }

    pub async fn run(&self, input: &BatchInput) -> Result<BatchOutput, CapabilityError> {
        let batch = input.seq;
        let mut stage_millis = BTreeMap::new();

        // Parsing: one call per record, in input order.
        let started = Instant::now();
        let mut parsed = Vec::with_capacity(input.records.len());
        for record in &input.records {
            let message: ParsedMessage = self.call(Stage::Parse, prompts::parse(record)).await?;
            parsed.push(message);
        }
        stage_millis.insert(Stage::Parse, elapsed_ms(started));
        debug!(batch, messages = parsed.len(), "Parsing complete");

        let started = Instant::now();
        let routing: RoutingDecision = self.call(Stage::Route, prompts::route(&parsed)).await?;
        stage_millis.insert(Stage::Route, elapsed_ms(started));

        let selection = Selection::from(routing.run_agents);
        info!(
            batch,
            selected = %selection,
            rationale = routing.rationale.as_str(),
            "Routing decision"
        );

        let (
            (knowledge, knowledge_ms),
            (stakeholders, stakeholder_ms),
            (memory, memory_ms),
        ) = tokio::try_join!(
            self.call_if_selected::<KnowledgeAnalysis>(selection, Agent::Knowledge, || {
                prompts::knowledge(&parsed)
            }),
            self.call_if_selected::<StakeholderAnalysis>(selection, Agent::Stakeholder, || {
                prompts::stakeholder(&parsed)
            }),
            self.call_if_selected::<MemoryAnalysis>(selection, Agent::Memory, || {
                prompts::memory(&input.memory_context, &parsed)
            }),
        )?;
        for (stage, ms) in [
            (Stage::Knowledge, knowledge_ms),
            (Stage::Stakeholder, stakeholder_ms),
            (Stage::Memory, memory_ms),
        ] {
            if let Some(ms) = ms {
                stage_millis.insert(stage, ms);
            }
        }

        let (audit, audit_ms) = self
            .call_if_selected::<AuditReport>(selection, Agent::Audit, || {
                prompts::audit(&knowledge, &stakeholders, &memory)
            })
            .await?;
        if let Some(ms) = audit_ms {
            stage_millis.insert(Stage::Audit, ms);
        }

        let started = Instant::now();
        let recommendations: Recommendations = self
            .call(
                Stage::Synthesis,
                prompts::synthesis(&routing, &parsed, &knowledge, &stakeholders, &memory, &audit),
            )
            .await?;
        stage_millis.insert(Stage::Synthesis, elapsed_ms(started));

        Ok(BatchOutput {
            seq: batch,
            record_count: input.records.len(),
            parsed,
            routing,
            selection,
            knowledge,
            stakeholders,
            memory,
            audit,
            recommendations,
            stage_millis,
        })
    }

    /// Run `agent`'s stage when selected; otherwise contribute its empty default.
    async fn call_if_selected<T>(
        &self,
        selection: Selection,
        agent: Agent,
        prompt: impl FnOnce() -> String,
    ) -> Result<(T, Option<u64>), CapabilityError>
    where
        T: DeserializeOwned + StageOutput + Default,
    {
        if !selection.contains(agent) {
            return Ok((T::default(), None));
        }
        let started = Instant::now();
        let output = self.call(agent.stage(), prompt()).await?;
        Ok((output, Some(elapsed_ms(started))))
    }

    async fn call<T>(&self, stage: Stage, prompt: String) -> Result<T, CapabilityError>
    where
        T: DeserializeOwned + StageOutput,
    {
        let invocation = self.capability.invoke(stage, &prompt);
        let value = match self.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, invocation)
                .await
                .map_err(|_| CapabilityError::Timeout {
                    stage,
                    secs: limit.as_secs(),
                })??,
            None => invocation.await?,
        };

        let output: T = serde_json::from_value(value).map_err(|e| CapabilityError::Validation {
            stage,
            message: e.to_string(),
        })?;
        output
            .validate()
            .map_err(|message| CapabilityError::Validation { stage, message })?;
        Ok(output)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockCapability};
    use serde_json::json;

    fn input(records: Vec<Record>) -> BatchInput {
        BatchInput {
            seq: 1,
            records,
            memory_context: MemoryContext::default(),
        }
    }

    #[tokio::test]
    async fn unselected_stages_are_never_invoked() {
        let mock = Arc::new(MockCapability::new());
        let pipeline = Pipeline::new(mock.clone(), None);

        let out = pipeline
            .run(&input(vec![fixtures::mail(0, "a@corp.com", &["b@corp.com"])]))
            .await
            .unwrap();

        assert!(out.selection.is_empty());
        assert_eq!(mock.call_count(Stage::Parse), 1);
        assert_eq!(mock.call_count(Stage::Route), 1);
        for stage in [Stage::Knowledge, Stage::Stakeholder, Stage::Memory, Stage::Audit] {
            assert_eq!(mock.call_count(stage), 0, "{stage}");
            assert!(!out.stage_millis.contains_key(&stage));
        }
        assert_eq!(mock.call_count(Stage::Synthesis), 1);
        assert!(out.knowledge.is_empty());
    }

    #[tokio::test]
    async fn stages_run_in_dependency_order() {
        let mock = Arc::new(MockCapability::new().route_all());
        let pipeline = Pipeline::new(mock.clone(), None);

        pipeline
            .run(&input(fixtures::mails(2)))
            .await
            .unwrap();

        let stages: Vec<Stage> = mock.calls().into_iter().map(|(s, _)| s).collect();
        assert_eq!(&stages[..3], &[Stage::Parse, Stage::Parse, Stage::Route]);
        let mut fan_out = stages[3..6].to_vec();
        fan_out.sort();
        assert_eq!(fan_out, vec![Stage::Knowledge, Stage::Stakeholder, Stage::Memory]);
        assert_eq!(&stages[6..], &[Stage::Audit, Stage::Synthesis]);
    }

    #[tokio::test]
    async fn parse_failure_aborts_before_routing() {
        let mock = Arc::new(MockCapability::new().fail_when(Stage::Parse, "BOOM"));
        let pipeline = Pipeline::new(mock.clone(), None);

        let mut records = fixtures::mails(3);
        records[1].text.push_str("\nBOOM");
        let err = pipeline.run(&input(records)).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Parse);
        assert_eq!(mock.call_count(Stage::Parse), 2);
        assert_eq!(mock.call_count(Stage::Route), 0);
    }

    #[tokio::test]
    async fn schema_mismatch_is_validation_error() {
        let mock = Arc::new(
            MockCapability::new().respond(Stage::Route, json!({"rationale": "no flags"})),
        );
        let pipeline = Pipeline::new(mock, None);

        let err = pipeline.run(&input(fixtures::mails(1))).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.stage(), Stage::Route);
    }

    #[tokio::test]
    async fn failing_analyst_fails_the_batch() {
        let mock = Arc::new(
            MockCapability::new()
                .route_all()
                .fail_when(Stage::Stakeholder, ""),
        );
        let pipeline = Pipeline::new(mock.clone(), None);

        let err = pipeline.run(&input(fixtures::mails(1))).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Stakeholder);
        assert_eq!(mock.call_count(Stage::Audit), 0);
        assert_eq!(mock.call_count(Stage::Synthesis), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let mock = Arc::new(MockCapability::new().with_delay(Duration::from_secs(30)));
        let pipeline = Pipeline::new(mock, Some(Duration::from_secs(5)));

        let err = pipeline.run(&input(fixtures::mails(1))).await.unwrap_err();
        assert!(matches!(
            err,
            CapabilityError::Timeout {
                stage: Stage::Parse,
                secs: 5
            }
        ));
    }
}
