use std::collections::BTreeMap;

use orgmind_common::Stage;

use crate::pipeline::BatchOutput;
use crate::store::ApplyStats;

/// Per-run counters, printed when a run completes.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub batches_applied: u32,
    pub batches_failed: u32,
    pub ticks_dropped: u32,
    pub messages_parsed: u32,
    pub people_created: u32,
    pub topics_created: u32,
    pub topics_rewritten: u32,
    pub conflicts_logged: u32,
    pub decisions_logged: u32,
    pub edges_logged: u32,
    pub stage_runs: BTreeMap<Stage, u32>,
}

impl RunStats {
    pub fn record_batch(&mut self, out: &BatchOutput, applied: &ApplyStats) {
        self.batches_applied += 1;
        self.messages_parsed += out.parsed.len() as u32;
        self.people_created += applied.people_created as u32;
        self.topics_created += applied.topics_created as u32;
        self.topics_rewritten += applied.topics_rewritten as u32;
        self.conflicts_logged += applied.conflicts_logged as u32;
        self.decisions_logged += applied.decisions_logged as u32;
        self.edges_logged += applied.edges_logged as u32;
        for stage in out.stage_millis.keys() {
            *self.stage_runs.entry(*stage).or_default() += 1;
        }
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Extraction Run Complete ===")?;
        writeln!(f, "Batches applied:    {}", self.batches_applied)?;
        writeln!(f, "Batches failed:     {}", self.batches_failed)?;
        writeln!(f, "Ticks dropped:      {}", self.ticks_dropped)?;
        writeln!(f, "Messages parsed:    {}", self.messages_parsed)?;
        writeln!(f, "People created:     {}", self.people_created)?;
        writeln!(f, "Topics created:     {}", self.topics_created)?;
        writeln!(f, "Topics rewritten:   {}", self.topics_rewritten)?;
        writeln!(f, "Conflicts logged:   {}", self.conflicts_logged)?;
        writeln!(f, "Decisions logged:   {}", self.decisions_logged)?;
        writeln!(f, "Flow edges:         {}", self.edges_logged)?;
        writeln!(f, "\nStage runs:")?;
        for stage in Stage::ALL {
            let runs = self.stage_runs.get(&stage).copied().unwrap_or(0);
            writeln!(f, "  {:<12} {}", stage.as_str(), runs)?;
        }
        Ok(())
    }
}
