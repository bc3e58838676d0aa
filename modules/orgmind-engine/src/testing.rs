// Test mocks for the extraction engine.
//
// Two mocks matching the two trait boundaries:
// - MockRecordSource (RecordSource) — in-memory record list or a canned failure
// - MockCapability (Capability) — per-stage canned payloads, failures and delays
//
// Plus `fixtures` for building records and pipeline outputs by hand.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use orgmind_common::{CapabilityError, Record, Stage};

use crate::traits::{Capability, RecordSource};

// ---------------------------------------------------------------------------
// MockRecordSource
// ---------------------------------------------------------------------------

/// Serves a fixed record list, honouring `limit`. `failing()` simulates an unreadable dataset.
pub struct MockRecordSource {
    records: Vec<Record>,
    failure: Option<String>,
    reads: Mutex<usize>,
}

impl MockRecordSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            failure: None,
            reads: Mutex::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            records: Vec::new(),
            failure: Some(message.to_string()),
            reads: Mutex::new(0),
        }
    }

    pub fn read_count(&self) -> usize {
        *self.reads.lock().unwrap()
    }
}

#[async_trait]
impl RecordSource for MockRecordSource {
    async fn read_first_n(&self, path: &Path, limit: usize) -> Result<Vec<Record>> {
        *self.reads.lock().unwrap() += 1;
        if let Some(message) = &self.failure {
            bail!("{}: {message}", path.display());
        }
        Ok(self.records.iter().take(limit).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// MockCapability
// ---------------------------------------------------------------------------

/// Canned stage responses. Records every call.
///
/// Defaults: parse reads the `From:` / `To:` header lines out of the prompt,
/// routing selects nothing, analysts return empty payloads, synthesis returns
/// a one-line brief.
///
/// Builder: `.route_all()`, `.respond()`, `.fail_when()`, `.panic_when()`, `.with_delay()`.
pub struct MockCapability {
    responses: HashMap<Stage, Value>,
    failures: Vec<(Stage, String)>,
    panics: Vec<(Stage, String)>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(Stage, String)>>,
}

impl Default for MockCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCapability {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            failures: Vec::new(),
            panics: Vec::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Routing switches every analyst on.
    pub fn route_all(self) -> Self {
        self.respond(
            Stage::Route,
            json!({
                "runAgents": {"knowledge": true, "stakeholder": true, "memory": true, "audit": true},
                "rationale": "substantive thread"
            }),
        )
    }

    pub fn respond(mut self, stage: Stage, payload: Value) -> Self {
        self.responses.insert(stage, payload);
        self
    }

    /// Fail `stage` whenever its prompt contains `needle`. An empty needle always fails.
    pub fn fail_when(mut self, stage: Stage, needle: &str) -> Self {
        self.failures.push((stage, needle.to_string()));
        self
    }

    /// Panic inside `stage` whenever its prompt contains `needle`.
    pub fn panic_when(mut self, stage: Stage, needle: &str) -> Self {
        self.panics.push((stage, needle.to_string()));
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(Stage, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, stage: Stage) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .count()
    }

    fn default_response(stage: Stage, prompt: &str) -> Value {
        match stage {
            Stage::Parse => parse_headers(prompt),
            Stage::Route => json!({
                "runAgents": {"knowledge": false, "stakeholder": false, "memory": false, "audit": false},
                "rationale": "routine traffic"
            }),
            Stage::Knowledge => json!({"topics": [], "decisions": [], "facts": []}),
            Stage::Stakeholder => json!({"stakeholders": []}),
            Stage::Memory => json!({"updates": []}),
            Stage::Audit => json!({"conflicts": []}),
            Stage::Synthesis => json!({"brief": "Nothing needs attention.", "notify": [], "actions": []}),
        }
    }
}

#[async_trait]
impl Capability for MockCapability {
    async fn invoke(&self, stage: Stage, prompt: &str) -> Result<Value, CapabilityError> {
        self.calls
            .lock()
            .unwrap()
            .push((stage, prompt.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let matches = |rules: &[(Stage, String)]| {
            rules
                .iter()
                .any(|(s, needle)| *s == stage && prompt.contains(needle.as_str()))
        };
        if matches(&self.panics) {
            panic!("MockCapability: {stage} panicked");
        }
        if matches(&self.failures) {
            return Err(CapabilityError::Call {
                stage,
                message: "MockCapability: injected failure".into(),
            });
        }

        Ok(self
            .responses
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| Self::default_response(stage, prompt)))
    }
}

fn parse_headers(prompt: &str) -> Value {
    let header = |name: &str| {
        prompt
            .lines()
            .find_map(|l| l.strip_prefix(name))
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };
    let sender = header("From:");
    let recipients: Vec<String> = header("To:")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    json!({
        "sender": sender,
        "senderName": null,
        "recipients": recipients,
        "subject": header("Subject:"),
        "summary": "",
    })
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub mod fixtures {
    use std::collections::BTreeMap;

    use orgmind_common::{ChangeType, KnowledgeChangeEvent, Record, Recommendations};

    use crate::pipeline::BatchOutput;
    use crate::stages::{
        Agent, AuditFinding, AuditReport, KnowledgeAnalysis, MemoryAnalysis, ParsedMessage,
        RoutingDecision, Selection, Stakeholder, StakeholderAnalysis,
    };

    /// An email record `msg-{i}` with parseable headers.
    pub fn mail(i: usize, from: &str, to: &[&str]) -> Record {
        Record::new(
            format!("msg-{i}"),
            format!(
                "From: {from}\nTo: {}\nSubject: Message {i}\n\nBody of message {i}.",
                to.join(", ")
            ),
        )
    }

    /// `n` mails rotating through a small cast.
    pub fn mails(n: usize) -> Vec<Record> {
        const CAST: [&str; 4] = [
            "kay@enron.com",
            "phillip@enron.com",
            "sally@enron.com",
            "john@enron.com",
        ];
        (0..n)
            .map(|i| mail(i, CAST[i % CAST.len()], &[CAST[(i + 1) % CAST.len()]]))
            .collect()
    }

    /// Hand-built `BatchOutput`. Adding output for an analyst also selects it.
    pub struct OutputBuilder {
        out: BatchOutput,
    }

    impl Default for OutputBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl OutputBuilder {
        pub fn new() -> Self {
            Self {
                out: BatchOutput {
                    seq: 1,
                    record_count: 0,
                    parsed: Vec::new(),
                    routing: RoutingDecision {
                        rationale: "test".into(),
                        ..Default::default()
                    },
                    selection: Selection::none(),
                    knowledge: KnowledgeAnalysis::default(),
                    stakeholders: StakeholderAnalysis::default(),
                    memory: MemoryAnalysis::default(),
                    audit: AuditReport::default(),
                    recommendations: Recommendations::default(),
                    stage_millis: BTreeMap::new(),
                },
            }
        }

        fn select(mut self, agent: Agent) -> Self {
            self.out.selection = self.out.selection.with(agent);
            self
        }

        pub fn select_all(mut self) -> Self {
            self.out.selection = Selection::all();
            self
        }

        pub fn message(mut self, from: &str, to: &[&str]) -> Self {
            self.out.parsed.push(ParsedMessage {
                sender: from.to_string(),
                sender_name: None,
                recipients: to.iter().map(|s| s.to_string()).collect(),
                subject: String::new(),
                summary: String::new(),
                intent: None,
            });
            self.out.record_count += 1;
            self
        }

        pub fn topic(mut self, topic: &str) -> Self {
            self.out.knowledge.topics.push(topic.to_string());
            self.select(Agent::Knowledge)
        }

        pub fn decision(mut self, decision: &str) -> Self {
            self.out.knowledge.decisions.push(decision.to_string());
            self.select(Agent::Knowledge)
        }

        pub fn stakeholder(mut self, id: &str, importance: &str, topics: &[&str]) -> Self {
            self.out.stakeholders.stakeholders.push(Stakeholder {
                id: id.to_string(),
                name: None,
                importance: importance.to_string(),
                topics: topics.iter().map(|s| s.to_string()).collect(),
            });
            self.select(Agent::Stakeholder)
        }

        pub fn update(mut self, topic: &str, change_type: ChangeType, summary: &str) -> Self {
            self.out.memory.updates.push(KnowledgeChangeEvent {
                topic: topic.to_string(),
                change_type,
                summary: summary.to_string(),
            });
            self.select(Agent::Memory)
        }

        pub fn conflict(mut self, topic: &str, description: &str, severity: &str) -> Self {
            self.out.audit.conflicts.push(AuditFinding {
                topic: topic.to_string(),
                description: description.to_string(),
                severity: severity.to_string(),
            });
            self.select(Agent::Audit)
        }

        pub fn brief(mut self, brief: &str) -> Self {
            self.out.recommendations.brief = brief.to_string();
            self
        }

        pub fn build(self) -> BatchOutput {
            self.out
        }
    }
}
