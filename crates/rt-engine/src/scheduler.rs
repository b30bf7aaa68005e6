//! The Tick Scheduler: advances time and drives every
//! handler-declared job, in lexicographic handler-name order, isolating
//! per-job failures.

use std::sync::Arc;

use rt_store_core::PersistentStore;
use serde_json::json;

use crate::error::SchedulerError;
use crate::exec::Executor;
use crate::registry::Registry;

/// Outcome of one [`Scheduler::tick`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Handler names whose job ran successfully.
    pub ran: Vec<String>,
    /// Handler names whose job raised; the job was skipped, not the tick.
    pub failed: Vec<String>,
}

/// Drives every handler-declared job once per call.
pub struct Scheduler {
    executor: Executor,
    registry: Arc<Registry>,
}

impl Scheduler {
    /// Build a scheduler that runs jobs via `executor`, discovered through
    /// `registry`.
    pub fn new(store: Arc<dyn PersistentStore>, registry: Arc<Registry>) -> Self {
        Self {
            executor: Executor::new(store, registry.clone()),
            registry,
        }
    }

    /// Run every handler's declared job once, with input `{time_now_ms}`.
    pub async fn tick(&self, time_now_ms: i64) -> Result<TickReport, SchedulerError> {
        let mut report = TickReport::default();
        for (handler, job) in self.registry.job_handlers() {
            let input = json!({ "time_now_ms": time_now_ms });
            match self.executor.run_command(&handler, &job, input, time_now_ms).await {
                Ok(_) => report.ran.push(handler),
                Err(err) => {
                    tracing::warn!(handler = %handler, job = %job, error = %err, "job failed, skipping");
                    report.failed.push(handler);
                }
            }
        }
        Ok(report)
    }
}
