use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Records ---

/// One free-text record from the bulk source. Identity is its position in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(alias = "source_id", alias = "file")]
    pub source_id: String,
    #[serde(alias = "message")]
    pub text: String,
}

impl Record {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

// --- Run status ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Completed => "completed",
            RunPhase::Error => "error",
        };
        f.write_str(s)
    }
}

/// Process-wide progress of the current run. `Default` is the zero value a run resets to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub phase: RunPhase,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_batch_at: Option<DateTime<Utc>>,
    pub queued: usize,
    pub processed: usize,
    pub result_count: usize,
    pub error_count: usize,
    pub batch_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RunStatus {
    pub fn is_running(&self) -> bool {
        self.phase == RunPhase::Running
    }

    /// Records loaded at run start. Holds at every observation point once loading completes.
    pub fn loaded(&self) -> usize {
        self.queued + self.processed
    }
}

// --- Knowledge indexes ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonEntry {
    pub id: String,
    pub display_name: Option<String>,
    /// Importance label inferred by the stakeholder stage.
    pub role: Option<String>,
    pub message_count: u32,
    pub topics: Vec<String>,
}

impl PersonEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            role: None,
            message_count: 0,
            topics: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicEntry {
    pub topic: String,
    pub summary: String,
    pub confidence: f64,
    pub is_new: bool,
    pub is_conflicting: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub topic: String,
    pub description: String,
    pub severity: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    New,
    Update,
    Conflict,
}

impl ChangeType {
    /// Confidence assigned to a topic rewritten by an event of this type.
    pub fn confidence(self) -> f64 {
        match self {
            ChangeType::Conflict => 0.4,
            ChangeType::New => 0.75,
            ChangeType::Update => 0.6,
        }
    }
}

/// A "memory update": one reclassification of a topic by the memory stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeChangeEvent {
    pub topic: String,
    pub change_type: ChangeType,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FlowIntent {
    #[default]
    Inform,
    Propose,
    Debate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InformationFlowEdge {
    pub from: String,
    pub to: String,
    pub topic: String,
    pub intent: FlowIntent,
}

// --- Synthesis ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    /// "high", "medium" or "low"
    pub priority: String,
    pub action: String,
    pub owner: Option<String>,
}

/// Executive output of the synthesis stage. Replaced wholesale after every batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub brief: String,
    #[serde(default)]
    pub notify: Vec<String>,
    #[serde(default)]
    pub actions: Vec<ActionItem>,
}

/// The append-only logs plus the current recommendations, newest entries first.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Updates {
    pub knowledge_change_log: Vec<KnowledgeChangeEvent>,
    pub decision_log: Vec<String>,
    pub recommendations: Option<Recommendations>,
    pub information_flow_log: Vec<InformationFlowEdge>,
}

// --- Pipeline stages ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parse,
    Route,
    Knowledge,
    Stakeholder,
    Memory,
    Audit,
    Synthesis,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Parse,
        Stage::Route,
        Stage::Knowledge,
        Stage::Stakeholder,
        Stage::Memory,
        Stage::Audit,
        Stage::Synthesis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Parse => "parse",
            Stage::Route => "route",
            Stage::Knowledge => "knowledge",
            Stage::Stakeholder => "stakeholder",
            Stage::Memory => "memory",
            Stage::Audit => "audit",
            Stage::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ran,
    Skipped,
    /// Audit ran while selected and reported at least one conflict.
    Conflict,
}

/// One batch's pipeline execution, kept for inspection until the next batch replaces it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub batch: usize,
    pub record_count: usize,
    pub captured_at: DateTime<Utc>,
    pub stages: BTreeMap<Stage, StageStatus>,
    pub routing_rationale: String,
    pub outputs: BTreeMap<Stage, serde_json::Value>,
    pub timeline: Vec<String>,
}

impl RunSnapshot {
    pub fn status_of(&self, stage: Stage) -> Option<StageStatus> {
        self.stages.get(&stage).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accepts_dataset_column_names() {
        let r: Record =
            serde_json::from_str(r#"{"file":"allen-p/_sent_mail/1.","message":"hi"}"#).unwrap();
        assert_eq!(r.source_id, "allen-p/_sent_mail/1.");
        assert_eq!(r.text, "hi");

        let r: Record = serde_json::from_str(r#"{"sourceId":"a","text":"b"}"#).unwrap();
        assert_eq!(r, Record::new("a", "b"));
    }

    #[test]
    fn change_type_confidence() {
        assert_eq!(ChangeType::Conflict.confidence(), 0.4);
        assert_eq!(ChangeType::New.confidence(), 0.75);
        assert_eq!(ChangeType::Update.confidence(), 0.6);
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = RunStatus {
            queued: 3,
            processed: 7,
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "idle");
        assert_eq!(json["resultCount"], 0);
        assert!(json.get("message").is_none());
        assert_eq!(status.loaded(), 10);
    }
}
