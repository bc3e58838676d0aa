//! Snapshot assembly: what ran, what was skipped and why, for one batch.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use orgmind_common::{ChangeType, RunSnapshot, Stage, StageStatus};

use crate::pipeline::BatchOutput;
use crate::stages::Agent;

pub fn assemble(out: &BatchOutput, captured_at: DateTime<Utc>) -> RunSnapshot {
    let mut stages = BTreeMap::new();
    stages.insert(Stage::Parse, StageStatus::Ran);
    stages.insert(Stage::Route, StageStatus::Ran);
    for agent in Agent::ALL {
        stages.insert(agent.stage(), agent_status(out, agent));
    }
    stages.insert(Stage::Synthesis, StageStatus::Ran);

    let mut outputs = BTreeMap::new();
    outputs.insert(Stage::Parse, to_value(&out.parsed));
    outputs.insert(Stage::Route, to_value(&out.routing));
    if out.selection.contains(Agent::Knowledge) {
        outputs.insert(Stage::Knowledge, to_value(&out.knowledge));
    }
    if out.selection.contains(Agent::Stakeholder) {
        outputs.insert(Stage::Stakeholder, to_value(&out.stakeholders));
    }
    if out.selection.contains(Agent::Memory) {
        outputs.insert(Stage::Memory, to_value(&out.memory));
    }
    if out.selection.contains(Agent::Audit) {
        outputs.insert(Stage::Audit, to_value(&out.audit));
    }
    outputs.insert(Stage::Synthesis, to_value(&out.recommendations));

    RunSnapshot {
        batch: out.seq,
        record_count: out.record_count,
        captured_at,
        stages,
        routing_rationale: out.routing.rationale.clone(),
        outputs,
        timeline: timeline(out),
    }
}

fn agent_status(out: &BatchOutput, agent: Agent) -> StageStatus {
    if !out.selection.contains(agent) {
        return StageStatus::Skipped;
    }
    if agent == Agent::Audit && !out.audit.conflicts.is_empty() {
        return StageStatus::Conflict;
    }
    StageStatus::Ran
}

fn timeline(out: &BatchOutput) -> Vec<String> {
    let mut milestones = vec![format!(
        "Routing selected {} for {} messages: {}",
        out.selection,
        out.parsed.len(),
        out.routing.rationale
    )];

    let k = &out.knowledge;
    let s = &out.stakeholders;
    if !k.is_empty() || !s.stakeholders.is_empty() {
        milestones.push(format!(
            "Analysis found {} topics, {} decisions, {} facts, {} stakeholders",
            k.topics.len(),
            k.decisions.len(),
            k.facts.len(),
            s.stakeholders.len()
        ));
    }

    let m = &out.memory;
    if !m.updates.is_empty() {
        milestones.push(format!(
            "Memory classified {} topics ({} new, {} updated, {} conflicting)",
            m.updates.len(),
            m.count(ChangeType::New),
            m.count(ChangeType::Update),
            m.count(ChangeType::Conflict)
        ));
    }

    if !out.audit.conflicts.is_empty() {
        milestones.push(format!(
            "Audit flagged {} conflicts",
            out.audit.conflicts.len()
        ));
    }

    let r = &out.recommendations;
    milestones.push(format!(
        "Synthesis produced {} actions, {} to notify",
        r.actions.len(),
        r.notify.len()
    ));
    milestones
}

fn to_value<T: Serialize>(v: &T) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}
