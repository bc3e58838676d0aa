//! Knowledge aggregation store.
//!
//! Three keyed indexes (people, topics, conflicts) and three append-only logs
//! (decisions, knowledge changes, information flow), all newest-first, plus
//! the current recommendations. Written only by `apply`, once per successful
//! batch; keys are never removed. A new run starts from an empty store.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use orgmind_common::{
    ChangeType, Conflict, FlowIntent, InformationFlowEdge, KnowledgeChangeEvent, PersonEntry,
    Recommendations, TopicEntry, Updates,
};

use crate::pipeline::BatchOutput;
use crate::stages::prompts::{KnownTopic, MemoryContext};

pub const PLACEHOLDER_SUMMARY: &str = "Awaiting classification";
pub const PLACEHOLDER_CONFIDENCE: f64 = 0.5;
pub const FALLBACK_FLOW_TOPIC: &str = "general";

/// Decisions handed to the memory stage as context.
const MEMORY_CONTEXT_DECISIONS: usize = 20;

#[derive(Debug, Default)]
pub struct KnowledgeStore {
    people: HashMap<String, PersonEntry>,
    topics: HashMap<String, TopicEntry>,
    conflicts: VecDeque<Conflict>,
    change_log: VecDeque<KnowledgeChangeEvent>,
    decision_log: VecDeque<String>,
    flow_log: VecDeque<InformationFlowEdge>,
    recommendations: Option<Recommendations>,
}

/// What one `apply` changed, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    pub people_created: usize,
    pub topics_created: usize,
    pub topics_rewritten: usize,
    pub conflicts_logged: usize,
    pub decisions_logged: usize,
    pub edges_logged: usize,
}

impl KnowledgeStore {
    /// Merge one batch's outputs. Steps run in a fixed order; later steps see earlier writes.
    pub fn apply(&mut self, out: &BatchOutput, now: DateTime<Utc>) -> ApplyStats {
        let mut stats = ApplyStats::default();

        // 1. Participants seen in parsed messages. Counted once per message.
        for message in &out.parsed {
            let mut seen = HashSet::new();
            let participants = std::iter::once(&message.sender).chain(&message.recipients);
            for id in participants {
                if !seen.insert(id.as_str()) {
                    continue;
                }
                let person = self.people.entry(id.clone()).or_insert_with(|| {
                    stats.people_created += 1;
                    PersonEntry::new(id.clone())
                });
                person.message_count += 1;
                if id == &message.sender && person.display_name.is_none() {
                    person.display_name = message.sender_name.clone();
                }
            }
        }

        // 2. Stakeholders: role is overwritten, count untouched.
        for stakeholder in &out.stakeholders.stakeholders {
            let person = self
                .people
                .entry(stakeholder.id.clone())
                .or_insert_with(|| {
                    stats.people_created += 1;
                    PersonEntry::new(stakeholder.id.clone())
                });
            person.role = Some(stakeholder.importance.clone());
            if person.display_name.is_none() {
                person.display_name = stakeholder.name.clone();
            }
            for topic in &stakeholder.topics {
                if !person.topics.contains(topic) {
                    person.topics.push(topic.clone());
                }
            }
        }

        // 3. Placeholders for topics the knowledge stage named first.
        for topic in &out.knowledge.topics {
            if self.topics.contains_key(topic) {
                continue;
            }
            self.topics.insert(
                topic.clone(),
                TopicEntry {
                    topic: topic.clone(),
                    summary: PLACEHOLDER_SUMMARY.to_string(),
                    confidence: PLACEHOLDER_CONFIDENCE,
                    is_new: true,
                    is_conflicting: false,
                    updated_at: now,
                },
            );
            stats.topics_created += 1;
        }

        // 4. Memory events overwrite the whole entry. Newest classification wins.
        for event in &out.memory.updates {
            let entry = TopicEntry {
                topic: event.topic.clone(),
                summary: event.summary.clone(),
                confidence: event.change_type.confidence(),
                is_new: event.change_type == ChangeType::New,
                is_conflicting: event.change_type == ChangeType::Conflict,
                updated_at: now,
            };
            if self.topics.insert(event.topic.clone(), entry).is_none() {
                stats.topics_created += 1;
            }
            stats.topics_rewritten += 1;
        }
        prepend_block(&mut self.change_log, out.memory.updates.iter().cloned());

        // 5. Audit conflicts. An unknown topic is logged but not created.
        for finding in &out.audit.conflicts {
            if let Some(topic) = self.topics.get_mut(&finding.topic) {
                topic.is_conflicting = true;
            }
        }
        stats.conflicts_logged = out.audit.conflicts.len();
        prepend_block(
            &mut self.conflicts,
            out.audit.conflicts.iter().map(|finding| Conflict {
                topic: finding.topic.clone(),
                description: finding.description.clone(),
                severity: finding.severity.clone(),
            }),
        );

        // 6. Decisions, prepended as a block.
        prepend_block(&mut self.decision_log, out.knowledge.decisions.iter().cloned());
        stats.decisions_logged = out.knowledge.decisions.len();

        // 7. Information flow: one edge per recipient.
        let flow_topic = out
            .knowledge
            .topics
            .first()
            .map(String::as_str)
            .unwrap_or(FALLBACK_FLOW_TOPIC);
        let edges: Vec<InformationFlowEdge> = out
            .parsed
            .iter()
            .flat_map(|message| {
                let intent = message.intent.unwrap_or(FlowIntent::Inform);
                message.recipients.iter().map(move |to| InformationFlowEdge {
                    from: message.sender.clone(),
                    to: to.clone(),
                    topic: flow_topic.to_string(),
                    intent,
                })
            })
            .collect();
        stats.edges_logged = edges.len();
        prepend_block(&mut self.flow_log, edges);

        // 8. Synthesis replaces the previous batch's recommendations.
        self.recommendations = Some(out.recommendations.clone());

        stats
    }

    // --- Read side ---

    /// People by interaction count, busiest first.
    pub fn people(&self) -> Vec<PersonEntry> {
        let mut people: Vec<PersonEntry> = self.people.values().cloned().collect();
        people.sort_by(|a, b| {
            b.message_count
                .cmp(&a.message_count)
                .then_with(|| a.id.cmp(&b.id))
        });
        people
    }

    pub fn person(&self, id: &str) -> Option<&PersonEntry> {
        self.people.get(id)
    }

    /// Topics, most recently updated first.
    pub fn topics(&self) -> Vec<TopicEntry> {
        let mut topics: Vec<TopicEntry> = self.topics.values().cloned().collect();
        topics.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.topic.cmp(&b.topic))
        });
        topics
    }

    pub fn topic(&self, key: &str) -> Option<&TopicEntry> {
        self.topics.get(key)
    }

    pub fn conflicts(&self) -> Vec<Conflict> {
        self.conflicts.iter().cloned().collect()
    }

    pub fn updates(&self) -> Updates {
        Updates {
            knowledge_change_log: self.change_log.iter().cloned().collect(),
            decision_log: self.decision_log.iter().cloned().collect(),
            recommendations: self.recommendations.clone(),
            information_flow_log: self.flow_log.iter().cloned().collect(),
        }
    }

    /// Read-only view of the indexes for the memory stage.
    pub fn memory_context(&self) -> MemoryContext {
        let mut topics: Vec<KnownTopic> = self
            .topics
            .values()
            .map(|t| KnownTopic {
                topic: t.topic.clone(),
                summary: t.summary.clone(),
            })
            .collect();
        topics.sort_by(|a, b| a.topic.cmp(&b.topic));

        MemoryContext {
            topics,
            recent_decisions: self
                .decision_log
                .iter()
                .take(MEMORY_CONTEXT_DECISIONS)
                .cloned()
                .collect(),
        }
    }
}

fn prepend_block<T>(log: &mut VecDeque<T>, items: impl IntoIterator<Item = T>) {
    let items: Vec<T> = items.into_iter().collect();
    for item in items.into_iter().rev() {
        log.push_front(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::OutputBuilder;
    use chrono::Duration;

    #[test]
    fn counts_each_message_once_per_participant() {
        let out = OutputBuilder::new()
            .message("a@corp.com", &["b@corp.com", "a@corp.com", "b@corp.com"])
            .message("b@corp.com", &["c@corp.com"])
            .build();
        let mut store = KnowledgeStore::default();
        store.apply(&out, Utc::now());

        assert_eq!(store.person("a@corp.com").unwrap().message_count, 1);
        assert_eq!(store.person("b@corp.com").unwrap().message_count, 2);
        assert_eq!(store.person("c@corp.com").unwrap().message_count, 1);

        let people = store.people();
        assert_eq!(people[0].id, "b@corp.com");
    }

    #[test]
    fn stakeholder_sets_role_without_counting() {
        let out = OutputBuilder::new()
            .message("a@corp.com", &["b@corp.com"])
            .stakeholder("a@corp.com", "critical", &["Q3 budget"])
            .stakeholder("cfo@corp.com", "high", &[])
            .build();
        let mut store = KnowledgeStore::default();
        store.apply(&out, Utc::now());

        let a = store.person("a@corp.com").unwrap();
        assert_eq!(a.role.as_deref(), Some("critical"));
        assert_eq!(a.message_count, 1);
        assert_eq!(a.topics, vec!["Q3 budget".to_string()]);

        let cfo = store.person("cfo@corp.com").unwrap();
        assert_eq!(cfo.message_count, 0);

        let later = OutputBuilder::new()
            .stakeholder("a@corp.com", "medium", &["Q3 budget"])
            .build();
        store.apply(&later, Utc::now());
        let a = store.person("a@corp.com").unwrap();
        assert_eq!(a.role.as_deref(), Some("medium"));
        assert_eq!(a.message_count, 1);
        assert_eq!(a.topics.len(), 1);
    }

    #[test]
    fn knowledge_topic_creates_placeholder_once() {
        let mut store = KnowledgeStore::default();
        store.apply(&OutputBuilder::new().topic("Q3 budget").build(), Utc::now());

        let t = store.topic("Q3 budget").unwrap();
        assert_eq!(t.summary, PLACEHOLDER_SUMMARY);
        assert_eq!(t.confidence, PLACEHOLDER_CONFIDENCE);
        assert!(t.is_new);

        store.apply(
            &OutputBuilder::new()
                .update("Q3 budget", ChangeType::Update, "Approved at 1.2M")
                .build(),
            Utc::now(),
        );
        store.apply(&OutputBuilder::new().topic("Q3 budget").build(), Utc::now());
        assert_eq!(store.topic("Q3 budget").unwrap().summary, "Approved at 1.2M");
    }

    #[test]
    fn later_event_wins_wholesale() {
        let mut store = KnowledgeStore::default();
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(15);

        store.apply(
            &OutputBuilder::new()
                .update("Hiring", ChangeType::Conflict, "Two freeze dates")
                .build(),
            t1,
        );
        store.apply(
            &OutputBuilder::new()
                .update("Hiring", ChangeType::New, "Freeze from June 1")
                .build(),
            t2,
        );

        let t = store.topic("Hiring").unwrap();
        assert_eq!(t.summary, "Freeze from June 1");
        assert_eq!(t.confidence, 0.75);
        assert!(t.is_new);
        assert!(!t.is_conflicting);
        assert_eq!(t.updated_at, t2);

        let updates = store.updates();
        assert_eq!(updates.knowledge_change_log.len(), 2);
        assert_eq!(updates.knowledge_change_log[0].change_type, ChangeType::New);
    }

    #[test]
    fn audit_flags_existing_topic_and_keeps_stale_is_new() {
        let mut store = KnowledgeStore::default();
        let out = OutputBuilder::new()
            .update("Q3 budget", ChangeType::New, "1.2M")
            .conflict("Q3 budget", "1.2M vs 1.4M", "high")
            .build();
        store.apply(&out, Utc::now());

        let t = store.topic("Q3 budget").unwrap();
        assert!(t.is_conflicting);
        assert!(t.is_new);
    }

    #[test]
    fn audit_conflict_on_unknown_topic_is_logged_only() {
        let mut store = KnowledgeStore::default();
        store.apply(
            &OutputBuilder::new()
                .conflict("Houston move", "dates disagree", "low")
                .build(),
            Utc::now(),
        );
        assert_eq!(store.conflicts().len(), 1);
        assert!(store.topics().is_empty());
    }

    #[test]
    fn logs_are_newest_first() {
        let mut store = KnowledgeStore::default();
        store.apply(
            &OutputBuilder::new()
                .decision("Freeze hiring")
                .decision("Move to Houston")
                .conflict("A", "first", "low")
                .build(),
            Utc::now(),
        );
        store.apply(
            &OutputBuilder::new()
                .decision("Cancel offsite")
                .conflict("B", "second", "low")
                .build(),
            Utc::now(),
        );

        let updates = store.updates();
        assert_eq!(
            updates.decision_log,
            vec!["Cancel offsite", "Freeze hiring", "Move to Houston"]
        );
        assert_eq!(store.conflicts()[0].topic, "B");
    }

    #[test]
    fn every_log_keeps_batch_order_within_a_batch() {
        let mut store = KnowledgeStore::default();
        store.apply(
            &OutputBuilder::new()
                .update("Hiring", ChangeType::New, "Freeze from June 1")
                .conflict("Hiring", "old", "low")
                .build(),
            Utc::now(),
        );
        store.apply(
            &OutputBuilder::new()
                .update("Q3 budget", ChangeType::Update, "Approved at 1.2M")
                .update("Offsite", ChangeType::New, "Moved to Austin")
                .conflict("Q3 budget", "two figures", "high")
                .conflict("Offsite", "two venues", "low")
                .decision("Approve budget")
                .decision("Book venue")
                .build(),
            Utc::now(),
        );

        let changes: Vec<String> = store
            .updates()
            .knowledge_change_log
            .into_iter()
            .map(|e| e.topic)
            .collect();
        assert_eq!(changes, vec!["Q3 budget", "Offsite", "Hiring"]);

        let conflicts: Vec<String> = store.conflicts().into_iter().map(|c| c.topic).collect();
        assert_eq!(conflicts, vec!["Q3 budget", "Offsite", "Hiring"]);

        assert_eq!(
            store.updates().decision_log,
            vec!["Approve budget", "Book venue"]
        );
    }

    #[test]
    fn flow_edges_use_first_topic_and_intent() {
        let mut out = OutputBuilder::new()
            .message("a@corp.com", &["b@corp.com", "c@corp.com"])
            .topic("Q3 budget")
            .topic("Hiring")
            .build();
        out.parsed[0].intent = Some(FlowIntent::Propose);

        let mut store = KnowledgeStore::default();
        store.apply(&out, Utc::now());
        let flow = store.updates().information_flow_log;
        assert_eq!(flow.len(), 2);
        assert!(flow.iter().all(|e| e.topic == "Q3 budget"));
        assert!(flow.iter().all(|e| e.intent == FlowIntent::Propose));
        assert_eq!(flow[0].to, "b@corp.com");
    }

    #[test]
    fn flow_edges_fall_back_without_topics() {
        let mut store = KnowledgeStore::default();
        store.apply(
            &OutputBuilder::new()
                .message("a@corp.com", &["b@corp.com"])
                .build(),
            Utc::now(),
        );
        let flow = store.updates().information_flow_log;
        assert_eq!(flow[0].topic, FALLBACK_FLOW_TOPIC);
        assert_eq!(flow[0].intent, FlowIntent::Inform);
    }

    #[test]
    fn recommendations_replaced_each_batch() {
        let mut store = KnowledgeStore::default();
        store.apply(&OutputBuilder::new().brief("first").build(), Utc::now());
        store.apply(&OutputBuilder::new().brief("second").build(), Utc::now());
        assert_eq!(store.updates().recommendations.unwrap().brief, "second");
    }

    #[test]
    fn memory_context_reflects_indexes() {
        let mut store = KnowledgeStore::default();
        store.apply(
            &OutputBuilder::new()
                .update("Hiring", ChangeType::New, "Freeze")
                .decision("Freeze hiring")
                .build(),
            Utc::now(),
        );
        let ctx = store.memory_context();
        assert_eq!(ctx.topics[0].summary, "Freeze");
        assert_eq!(ctx.recent_decisions, vec!["Freeze hiring"]);
    }
}
