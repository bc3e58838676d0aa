//! Input/output contracts of the extraction stages.
//!
//! Every stage is an external text-in/structured-out capability. The types
//! here are the declared schemas: they are sent to the model as the forced
//! tool input schema and used to validate whatever comes back.

pub mod prompts;

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use orgmind_common::{ChangeType, FlowIntent, KnowledgeChangeEvent, Recommendations, Stage};

// ---------------------------------------------------------------------------
// Stage outputs
// ---------------------------------------------------------------------------

/// Parsing stage: structure of one raw message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage {
    /// Email address (or other stable id) of the author.
    pub sender: String,
    pub sender_name: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub summary: String,
    /// What the author is doing with the information: "inform", "propose" or "debate".
    #[serde(default)]
    pub intent: Option<FlowIntent>,
}

/// Routing stage: which downstream stages this batch warrants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub run_agents: RunAgents,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunAgents {
    pub knowledge: bool,
    pub stakeholder: bool,
    pub memory: bool,
    pub audit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeAnalysis {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub facts: Vec<String>,
}

impl KnowledgeAnalysis {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.decisions.is_empty() && self.facts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Stakeholder {
    /// Participant id, matching the ids the parsing stage reports.
    pub id: String,
    pub name: Option<String>,
    /// "critical", "high", "medium" or "low"
    pub importance: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StakeholderAnalysis {
    #[serde(default)]
    pub stakeholders: Vec<Stakeholder>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MemoryAnalysis {
    #[serde(default)]
    pub updates: Vec<KnowledgeChangeEvent>,
}

impl MemoryAnalysis {
    pub fn count(&self, change_type: ChangeType) -> usize {
        self.updates
            .iter()
            .filter(|u| u.change_type == change_type)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AuditFinding {
    pub topic: String,
    pub description: String,
    /// "high", "medium" or "low"
    pub severity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AuditReport {
    #[serde(default)]
    pub conflicts: Vec<AuditFinding>,
}

// ---------------------------------------------------------------------------
// Semantic checks beyond the JSON shape
// ---------------------------------------------------------------------------

/// Checks a deserialized stage output. A failure is reported as a validation error.
pub trait StageOutput {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl StageOutput for ParsedMessage {
    fn validate(&self) -> Result<(), String> {
        if self.sender.trim().is_empty() {
            return Err("sender is empty".into());
        }
        if self.recipients.iter().any(|r| r.trim().is_empty()) {
            return Err("recipient list contains an empty id".into());
        }
        Ok(())
    }
}

impl StageOutput for RoutingDecision {}
impl StageOutput for KnowledgeAnalysis {}

impl StageOutput for StakeholderAnalysis {
    fn validate(&self) -> Result<(), String> {
        match self.stakeholders.iter().find(|s| s.id.trim().is_empty()) {
            Some(_) => Err("stakeholder without id".into()),
            None => Ok(()),
        }
    }
}

impl StageOutput for MemoryAnalysis {
    fn validate(&self) -> Result<(), String> {
        match self.updates.iter().find(|u| u.topic.trim().is_empty()) {
            Some(_) => Err("memory update without topic".into()),
            None => Ok(()),
        }
    }
}

impl StageOutput for AuditReport {}
impl StageOutput for Recommendations {}

// ---------------------------------------------------------------------------
// Stage selection
// ---------------------------------------------------------------------------

/// A stage the router may switch on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Agent {
    Knowledge,
    Stakeholder,
    Memory,
    Audit,
}

impl Agent {
    pub const ALL: [Agent; 4] = [Agent::Knowledge, Agent::Stakeholder, Agent::Memory, Agent::Audit];

    pub fn stage(self) -> Stage {
        match self {
            Agent::Knowledge => Stage::Knowledge,
            Agent::Stakeholder => Stage::Stakeholder,
            Agent::Memory => Stage::Memory,
            Agent::Audit => Stage::Audit,
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// The set of agents a routing decision switched on.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Selection(u8);

impl Selection {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Agent::ALL.into_iter().collect()
    }

    pub fn with(mut self, agent: Agent) -> Self {
        self.0 |= agent.bit();
        self
    }

    pub fn contains(self, agent: Agent) -> bool {
        self.0 & agent.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Agent> {
        Agent::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl FromIterator<Agent> for Selection {
    fn from_iter<I: IntoIterator<Item = Agent>>(iter: I) -> Self {
        iter.into_iter().fold(Selection::none(), Selection::with)
    }
}

impl From<RunAgents> for Selection {
    fn from(flags: RunAgents) -> Self {
        let RunAgents {
            knowledge,
            stakeholder,
            memory,
            audit,
        } = flags;
        [
            (knowledge, Agent::Knowledge),
            (stakeholder, Agent::Stakeholder),
            (memory, Agent::Memory),
            (audit, Agent::Audit),
        ]
        .into_iter()
        .filter_map(|(on, agent)| on.then_some(agent))
        .collect()
    }
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(|a| a.stage().as_str()).collect();
        f.write_str(&names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_from_flags() {
        let sel = Selection::from(RunAgents {
            knowledge: true,
            stakeholder: false,
            memory: true,
            audit: false,
        });
        assert!(sel.contains(Agent::Knowledge));
        assert!(sel.contains(Agent::Memory));
        assert!(!sel.contains(Agent::Stakeholder));
        assert!(!sel.contains(Agent::Audit));
        assert_eq!(sel.to_string(), "knowledge, memory");
    }

    #[test]
    fn empty_selection_displays_none() {
        let sel = Selection::from(RunAgents::default());
        assert!(sel.is_empty());
        assert_eq!(sel.to_string(), "none");
        assert_eq!(Selection::all().iter().count(), 4);
    }

    #[test]
    fn routing_decision_wire_format() {
        let decision: RoutingDecision = serde_json::from_value(serde_json::json!({
            "runAgents": {"knowledge": true, "stakeholder": true, "memory": false, "audit": true},
            "rationale": "budget thread with a disputed figure"
        }))
        .unwrap();
        let sel = Selection::from(decision.run_agents);
        let expected: Selection = Selection::all().iter().filter(|a| *a != Agent::Memory).collect();
        assert_eq!(sel, expected);
    }

    #[test]
    fn parsed_message_requires_sender() {
        let msg = ParsedMessage {
            sender: "  ".into(),
            sender_name: None,
            recipients: vec![],
            subject: String::new(),
            summary: String::new(),
            intent: None,
        };
        assert!(msg.validate().is_err());
    }

    #[test]
    fn memory_update_parses_change_type() {
        let memory: MemoryAnalysis = serde_json::from_value(serde_json::json!({
            "updates": [
                {"topic": "Q3 budget", "changeType": "conflict", "summary": "two totals"},
                {"topic": "Hiring", "changeType": "new", "summary": "freeze"}
            ]
        }))
        .unwrap();
        assert_eq!(memory.count(ChangeType::Conflict), 1);
        assert_eq!(memory.count(ChangeType::New), 1);
        assert!(memory.validate().is_ok());
    }
}
