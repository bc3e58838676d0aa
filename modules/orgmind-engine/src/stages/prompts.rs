//! System prompts, user prompt builders and declared schemas, one per stage.

use ai_client::util::clip_for_prompt;
use ai_client::StructuredOutput;
use serde::Serialize;

use orgmind_common::{Record, Recommendations, Stage};

use super::{
    AuditReport, KnowledgeAnalysis, MemoryAnalysis, ParsedMessage, RoutingDecision,
    StakeholderAnalysis,
};

/// Raw records are clipped before they reach the parser.
const MAX_RECORD_BYTES: usize = 12_000;

const PARSE_SYSTEM: &str = "\
You parse one raw corporate email into structure.\n\
- sender: the author's email address exactly as written in the From header, lowercased.\n\
- senderName: the author's display name if the message shows one, else null.\n\
- recipients: every address in To, Cc and Bcc, lowercased, no duplicates.\n\
- subject: the Subject header, empty if absent.\n\
- summary: one or two sentences on what the message says, no quoting of signatures or disclaimers.\n\
- intent: \"propose\" when the author suggests a course of action, \"debate\" when they dispute \
or argue a point, otherwise \"inform\".";

const ROUTE_SYSTEM: &str = "\
You triage a batch of parsed emails and decide which analysts should look at it.\n\
- knowledge: the batch contains decisions, facts or named projects worth recording.\n\
- stakeholder: the batch reveals who matters for which subject (ownership, escalation, approval).\n\
- memory: the batch updates, revises or contradicts something the organisation already knew.\n\
- audit: the batch contains claims that might conflict with each other or with known facts.\n\
Turn an analyst on only when the batch gives them real material. Routine scheduling, \
newsletters and automated notices warrant nothing. Explain the decision in one short paragraph.";

const KNOWLEDGE_SYSTEM: &str = "\
You extract organisational knowledge from a batch of parsed emails.\n\
- topics: short, stable labels for the subjects discussed (\"Q3 budget\", \"Houston office move\"). \
Reuse the exact same label for the same subject.\n\
- decisions: one sentence per decision that was actually made, with who made it when known.\n\
- facts: concrete facts stated as settled (figures, dates, owners).";

const STAKEHOLDER_SYSTEM: &str = "\
You identify the stakeholders in a batch of parsed emails.\n\
For each person who drives, approves, blocks or is accountable for a subject, return their id \
(the email address used in the batch), their name if known, an importance of \"critical\", \
\"high\", \"medium\" or \"low\", and the topic labels they are involved in. \
Do not list people who are only copied.";

const MEMORY_SYSTEM: &str = "\
You maintain the organisation's memory. You are given the current topic index and the most \
recent decisions, followed by a new batch of parsed emails.\n\
Return one update per topic the batch touches:\n\
- changeType \"new\" when the topic is not in the index,\n\
- \"update\" when the batch refines or supersedes what the index says,\n\
- \"conflict\" when the batch contradicts the index or recorded decisions.\n\
The summary is the full current understanding of the topic after this batch, not a diff. \
Use the index's topic label verbatim when referring to an existing topic.";

const AUDIT_SYSTEM: &str = "\
You audit analyst output for a batch of emails. Look for statements that cannot all be true: \
different figures for the same quantity, decisions reversed without acknowledgement, owners \
disagreeing about who owns what. Return each conflict with the topic label it concerns, a \
description naming both sides, and a severity of \"high\", \"medium\" or \"low\". \
Return an empty list when nothing conflicts.";

const SYNTHESIS_SYSTEM: &str = "\
You brief an executive on a batch of organisational email.\n\
- brief: three to five sentences on what changed and what needs attention.\n\
- notify: ids of the people who should hear about this batch.\n\
- actions: concrete next steps, each with a priority of \"high\", \"medium\" or \"low\" and an \
owner id when one is obvious. Conflicts reported by the audit come first.";

pub fn system_prompt(stage: Stage) -> &'static str {
    match stage {
        Stage::Parse => PARSE_SYSTEM,
        Stage::Route => ROUTE_SYSTEM,
        Stage::Knowledge => KNOWLEDGE_SYSTEM,
        Stage::Stakeholder => STAKEHOLDER_SYSTEM,
        Stage::Memory => MEMORY_SYSTEM,
        Stage::Audit => AUDIT_SYSTEM,
        Stage::Synthesis => SYNTHESIS_SYSTEM,
    }
}

/// The declared output schema of a stage.
pub fn schema(stage: Stage) -> serde_json::Value {
    match stage {
        Stage::Parse => ParsedMessage::tool_schema(),
        Stage::Route => RoutingDecision::tool_schema(),
        Stage::Knowledge => KnowledgeAnalysis::tool_schema(),
        Stage::Stakeholder => StakeholderAnalysis::tool_schema(),
        Stage::Memory => MemoryAnalysis::tool_schema(),
        Stage::Audit => AuditReport::tool_schema(),
        Stage::Synthesis => Recommendations::tool_schema(),
    }
}

// ---------------------------------------------------------------------------
// User prompts
// ---------------------------------------------------------------------------

pub fn parse(record: &Record) -> String {
    format!(
        "Parse this email.\n\nSource: {}\n\n---\n\n{}",
        record.source_id,
        clip_for_prompt(&record.text, MAX_RECORD_BYTES)
    )
}

pub fn route(parsed: &[ParsedMessage]) -> String {
    format!(
        "Decide which analysts should run on this batch of {} emails.\n\n{}",
        parsed.len(),
        to_json(parsed)
    )
}

pub fn knowledge(parsed: &[ParsedMessage]) -> String {
    format!("Extract topics, decisions and facts.\n\n{}", to_json(parsed))
}

pub fn stakeholder(parsed: &[ParsedMessage]) -> String {
    format!("Identify the stakeholders.\n\n{}", to_json(parsed))
}

/// Current index state the memory stage classifies against.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryContext {
    pub topics: Vec<KnownTopic>,
    pub recent_decisions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnownTopic {
    pub topic: String,
    pub summary: String,
}

pub fn memory(context: &MemoryContext, parsed: &[ParsedMessage]) -> String {
    format!(
        "## Current topic index\n\n{}\n\n## Recent decisions\n\n{}\n\n## New batch\n\n{}",
        to_json(&context.topics),
        to_json(&context.recent_decisions),
        to_json(parsed)
    )
}

#[derive(Serialize)]
struct AnalystOutputs<'a> {
    knowledge: &'a KnowledgeAnalysis,
    stakeholders: &'a StakeholderAnalysis,
    memory: &'a MemoryAnalysis,
}

pub fn audit(
    knowledge: &KnowledgeAnalysis,
    stakeholders: &StakeholderAnalysis,
    memory: &MemoryAnalysis,
) -> String {
    format!(
        "Audit these analyst outputs for conflicts.\n\n{}",
        to_json(&AnalystOutputs {
            knowledge,
            stakeholders,
            memory,
        })
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisInput<'a> {
    routing: &'a RoutingDecision,
    messages: &'a [ParsedMessage],
    knowledge: &'a KnowledgeAnalysis,
    stakeholders: &'a StakeholderAnalysis,
    memory: &'a MemoryAnalysis,
    audit: &'a AuditReport,
}

pub fn synthesis(
    routing: &RoutingDecision,
    parsed: &[ParsedMessage],
    knowledge: &KnowledgeAnalysis,
    stakeholders: &StakeholderAnalysis,
    memory: &MemoryAnalysis,
    audit: &AuditReport,
) -> String {
    format!(
        "Write the executive brief for this batch.\n\n{}",
        to_json(&SynthesisInput {
            routing,
            messages: parsed,
            knowledge,
            stakeholders,
            memory,
            audit,
        })
    )
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_stage_has_prompt_and_object_schema() {
        for stage in Stage::ALL {
            assert!(!system_prompt(stage).is_empty());
            assert_eq!(schema(stage)["type"], "object", "{stage} schema");
        }
    }

    #[test]
    fn routing_schema_requires_every_flag() {
        let schema = schema(Stage::Route);
        let flags = &schema["properties"]["runAgents"];
        let required: Vec<&str> = flags["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        for flag in ["knowledge", "stakeholder", "memory", "audit"] {
            assert!(required.contains(&flag), "missing {flag}");
        }
    }

    #[test]
    fn parse_prompt_carries_source_and_text() {
        let record = Record::new("kaminski-v/inbox/12.", "From: vince@enron.com\nTo: a@enron.com");
        let prompt = parse(&record);
        assert!(prompt.contains("kaminski-v/inbox/12."));
        assert!(prompt.contains("From: vince@enron.com"));
    }

    #[test]
    fn memory_prompt_includes_index() {
        let context = MemoryContext {
            topics: vec![KnownTopic {
                topic: "Q3 budget".into(),
                summary: "Approved at 1.2M".into(),
            }],
            recent_decisions: vec!["Freeze hiring".into()],
        };
        let prompt = memory(&context, &[]);
        assert!(prompt.contains("Approved at 1.2M"));
        assert!(prompt.contains("Freeze hiring"));
    }
}
