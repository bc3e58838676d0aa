//! The engine aggregate: run status, record queue, knowledge store and the
//! latest snapshot, owned by one `Engine` and shared by handle.
//!
//! All mutation goes through `start_run`, `stop_run` and `run_batch`. The
//! store is written only by the batch holding the batch lock, so readers
//! always observe state between batches.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use orgmind_common::{
    Conflict, EngineConfig, EngineError, PersonEntry, RunPhase, RunSnapshot, RunStatus, Stage,
    TopicEntry, Updates,
};

use crate::pipeline::{BatchInput, Pipeline};
use crate::queue::RecordQueue;
use crate::run_log::{EventKind, RunEvent, RunLog};
use crate::scheduler::{spawn_ticker, TickOutcome};
use crate::snapshot;
use crate::stats::RunStats;
use crate::store::KnowledgeStore;
use crate::traits::{Capability, RecordSource};

/// Long-lived collaborators the engine is built from.
#[derive(Clone, TypedBuilder)]
pub struct EngineDeps {
    #[builder(default)]
    pub config: EngineConfig,
    pub source: Arc<dyn RecordSource>,
    pub capability: Arc<dyn Capability>,
}

#[derive(Default)]
struct EngineState {
    status: RunStatus,
    queue: RecordQueue,
    store: KnowledgeStore,
    snapshot: Option<RunSnapshot>,
    run_log: RunLog,
    stats: RunStats,
    ticker: Option<JoinHandle<()>>,
    /// Bumped on every start and stop. A batch whose generation is stale drops its output.
    generation: u64,
}

impl EngineState {
    fn halt_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn finish(&mut self) {
        self.status.phase = RunPhase::Completed;
        self.status.completed_at = Some(Utc::now());
        self.halt_ticker();
        self.run_log.log(EventKind::RunCompleted {
            processed: self.status.processed,
            result_count: self.status.result_count,
            error_count: self.status.error_count,
        });
        info!("Run complete. {}", self.stats);
    }

    fn fail(&mut self, err: &EngineError) {
        self.status.phase = RunPhase::Error;
        self.status.completed_at = Some(Utc::now());
        self.status.message = Some(err.to_string());
        self.halt_ticker();
        self.run_log.log(EventKind::RunFailed {
            error: err.to_string(),
        });
    }
}

pub struct Engine {
    config: EngineConfig,
    source: Arc<dyn RecordSource>,
    pipeline: Pipeline,
    state: RwLock<EngineState>,
    /// Held for the whole of one batch. Ticks `try_lock` and drop on contention;
    /// a run's first batch waits for it.
    batch_lock: Mutex<()>,
}

impl Engine {
    pub fn new(deps: EngineDeps) -> Arc<Self> {
        let EngineDeps {
            mut config,
            source,
            capability,
        } = deps;
        config.batch_size = config.batch_size.max(1);
        Arc::new(Self {
            pipeline: Pipeline::new(capability, config.stage_timeout),
            config,
            source,
            state: RwLock::new(EngineState::default()),
            batch_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Run control ---

    /// Start a fresh run. Returns once the first batch has been processed;
    /// later batches follow on the timer.
    ///
    /// The first batch and the ticker are driven from a spawned task, so a
    /// caller that gives up waiting does not strand the run.
    ///
    /// While a run is active this is a no-op: `AlreadyRunning` carries the
    /// current status and no index is touched.
    pub async fn start_run(self: &Arc<Self>) -> Result<RunStatus, EngineError> {
        let generation = {
            // The write lock is held across the load so no observer sees a half-initialised run.
            let mut state = self.state.write().await;
            if state.status.is_running() {
                info!("Run already in progress, ignoring start");
                return Err(EngineError::AlreadyRunning(Box::new(state.status.clone())));
            }

            let generation = state.generation + 1;
            state.halt_ticker();
            *state = EngineState {
                generation,
                ..Default::default()
            };
            let run_id = Uuid::new_v4().to_string();
            state.run_log.begin(run_id.clone());

            let path = &self.config.source_path;
            let records = match self
                .source
                .read_first_n(path, self.config.record_limit)
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    let err = EngineError::SourceUnavailable(format!("{e:#}"));
                    error!(path = %path.display(), error = %err, "Run failed to start");
                    state.fail(&err);
                    return Err(err);
                }
            };

            let loaded = records.len();
            state.queue.load(records);
            state.status.queued = loaded;
            state.status.phase = RunPhase::Running;
            state.status.started_at = Some(Utc::now());
            state.run_log.log(EventKind::RunStarted {
                run_id: run_id.clone(),
                records: loaded,
                batch_size: self.config.batch_size,
                interval_secs: self.config.batch_interval.as_secs(),
            });
            info!(
                run_id = run_id.as_str(),
                records = loaded,
                batch_size = self.config.batch_size,
                "Run started"
            );
            generation
        };

        let engine = Arc::clone(self);
        let first = tokio::spawn(async move {
            {
                let _batch = engine.batch_lock.lock().await;
                engine.process_next().await;
            }
            let mut state = engine.state.write().await;
            if state.generation == generation && state.status.is_running() {
                state.ticker = Some(spawn_ticker(
                    Arc::downgrade(&engine),
                    engine.config.batch_interval,
                ));
            }
            state.status.clone()
        });

        match first.await {
            Ok(status) => Ok(status),
            Err(join_err) => {
                let err = EngineError::BatchPanicked {
                    batch: 1,
                    message: join_err.to_string(),
                };
                error!(error = %err, "First batch aborted, halting run");
                let mut state = self.state.write().await;
                if state.generation == generation && state.status.is_running() {
                    state.fail(&err);
                }
                Err(err)
            }
        }
    }

    /// Cancel the active run. Queued records are left unprocessed and an
    /// in-flight batch's output is discarded. No-op when nothing is running.
    pub async fn stop_run(&self) -> RunStatus {
        let mut state = self.state.write().await;
        if !state.status.is_running() {
            return state.status.clone();
        }
        state.generation += 1;
        state.status.phase = RunPhase::Completed;
        state.status.completed_at = Some(Utc::now());
        state.status.message = Some("cancelled".to_string());
        state.halt_ticker();
        let queued = state.status.queued;
        state.run_log.log(EventKind::RunCancelled { queued });
        info!(queued, "Run cancelled");
        state.status.clone()
    }

    /// Process the next slice of the queue. Driven by the ticker; also callable
    /// directly to step a run by hand.
    pub async fn run_batch(&self) -> TickOutcome {
        let Ok(_batch) = self.batch_lock.try_lock() else {
            let mut state = self.state.write().await;
            state.stats.ticks_dropped += 1;
            state.run_log.log(EventKind::TickDropped);
            info!("Previous batch still running, dropping tick");
            return TickOutcome::Dropped;
        };
        self.process_next().await
    }

    /// Caller holds `batch_lock`.
    async fn process_next(&self) -> TickOutcome {
        let (input, generation) = {
            let mut state = self.state.write().await;
            if !state.status.is_running() {
                return TickOutcome::Idle;
            }
            if state.queue.is_empty() {
                state.finish();
                return TickOutcome::Completed;
            }

            // Records are consumed here whatever happens to the batch.
            let records = state.queue.take_batch(self.config.batch_size);
            let n = records.len();
            state.status.queued = state.queue.len();
            state.status.processed += n;
            state.status.batch_count += 1;
            state.status.last_batch_at = Some(Utc::now());
            let seq = state.status.batch_count;
            let queued_after = state.status.queued;
            state.run_log.log(EventKind::BatchStarted {
                batch: seq,
                records: n,
                queued_after,
            });
            info!(batch = seq, records = n, queued = queued_after, "Batch started");

            let input = BatchInput {
                seq,
                records,
                memory_context: state.store.memory_context(),
            };
            (input, state.generation)
        };
        let batch = input.seq;

        let pipeline = self.pipeline.clone();
        let joined = tokio::spawn(async move { pipeline.run(&input).await }).await;

        let mut state = self.state.write().await;
        if state.generation != generation {
            info!(batch, "Run changed while batch was in flight, discarding output");
            return TickOutcome::Discarded { batch };
        }

        let outcome = match joined {
            Err(join_err) => {
                let err = EngineError::BatchPanicked {
                    batch,
                    message: join_err.to_string(),
                };
                error!(batch, error = %err, "Batch aborted, halting run");
                state.fail(&err);
                return TickOutcome::Halted(err);
            }
            Ok(Err(e)) => {
                state.status.error_count += 1;
                state.stats.batches_failed += 1;
                warn!(batch, stage = %e.stage(), error = %e, "Batch failed");
                state.run_log.log(EventKind::BatchFailed {
                    batch,
                    stage: e.stage(),
                    error: e.to_string(),
                });
                TickOutcome::Failed { batch, error: e }
            }
            Ok(Ok(out)) => {
                let now = Utc::now();
                let applied = state.store.apply(&out, now);
                state.snapshot = Some(snapshot::assemble(&out, now));
                state.status.result_count += out.record_count;
                state.stats.record_batch(&out, &applied);

                for stage in Stage::ALL {
                    let kind = match out.stage_millis.get(&stage) {
                        Some(&millis) => EventKind::StageCompleted {
                            batch,
                            stage,
                            millis,
                        },
                        None => EventKind::StageSkipped { batch, stage },
                    };
                    state.run_log.log(kind);
                }
                state.run_log.log(EventKind::BatchApplied {
                    batch,
                    records: out.record_count,
                    topics_rewritten: applied.topics_rewritten,
                    conflicts: applied.conflicts_logged,
                    decisions: applied.decisions_logged,
                });
                info!(
                    batch,
                    records = out.record_count,
                    selected = %out.selection,
                    topics_rewritten = applied.topics_rewritten,
                    conflicts = applied.conflicts_logged,
                    "Batch applied"
                );
                TickOutcome::Processed {
                    batch,
                    records: out.record_count,
                }
            }
        };

        if state.queue.is_empty() {
            state.finish();
            return TickOutcome::Completed;
        }
        outcome
    }

    // --- Queries ---

    pub async fn status(&self) -> RunStatus {
        self.state.read().await.status.clone()
    }

    /// Participants by interaction count, descending.
    pub async fn people(&self) -> Vec<PersonEntry> {
        self.state.read().await.store.people()
    }

    pub async fn topics(&self) -> Vec<TopicEntry> {
        self.state.read().await.store.topics()
    }

    pub async fn conflicts(&self) -> Vec<Conflict> {
        self.state.read().await.store.conflicts()
    }

    pub async fn updates(&self) -> Updates {
        self.state.read().await.store.updates()
    }

    pub async fn latest_snapshot(&self) -> Option<RunSnapshot> {
        self.state.read().await.snapshot.clone()
    }

    pub async fn run_log(&self) -> Vec<RunEvent> {
        self.state.read().await.run_log.events().to_vec()
    }

    pub async fn stats(&self) -> RunStats {
        self.state.read().await.stats.clone()
    }
}
