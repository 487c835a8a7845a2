//! Memory-budgeted task execution.
//!
//! Feature tasks carry an estimated peak memory cost. The executor admits
//! tasks in arrival order into batches whose summed cost fits the budget,
//! runs each batch (in parallel when allowed) and repeats until done. The
//! budget is advisory: a task too big to ever fit still runs, alone, with a
//! warning, rather than deadlocking the pipeline.

use log::warn;

use crate::error::QuantizeError;
use crate::utils::Parallelism;

type TaskBody<'a> = Box<dyn FnOnce() -> Result<(), QuantizeError> + Send + 'a>;

struct ExecutorTask<'a> {
    cost: u64,
    body: TaskBody<'a>,
}

/// Executes tasks under an advisory memory budget.
pub struct ResourceConstrainedExecutor<'a> {
    budget: u64,
    parallelism: Parallelism,
    tasks: Vec<ExecutorTask<'a>>,
}

impl<'a> ResourceConstrainedExecutor<'a> {
    /// Executor with `budget` bytes of estimated memory to hand out per batch.
    pub fn new(budget: u64, parallelism: Parallelism) -> Self {
        Self {
            budget,
            parallelism,
            tasks: Vec::new(),
        }
    }

    /// Queue a task with an estimated peak memory cost in bytes.
    pub fn add(
        &mut self,
        cost: u64,
        body: impl FnOnce() -> Result<(), QuantizeError> + Send + 'a,
    ) {
        self.tasks.push(ExecutorTask {
            cost,
            body: Box::new(body),
        });
    }

    /// Run every queued task, stopping at the first error.
    ///
    /// Tasks within a batch run concurrently when parallelism allows;
    /// batches run one after another.
    pub fn exec_tasks(self) -> Result<(), QuantizeError> {
        let Self {
            budget,
            parallelism,
            tasks,
        } = self;

        let mut pending: Vec<Option<ExecutorTask<'a>>> = tasks.into_iter().map(Some).collect();

        while pending.iter().any(Option::is_some) {
            let live: Vec<usize> = (0..pending.len())
                .filter(|&i| pending[i].is_some())
                .collect();
            let costs: Vec<u64> = live
                .iter()
                .map(|&i| pending[i].as_ref().map(|t| t.cost).unwrap_or(0))
                .collect();

            let mut batch = plan_batch(&costs, budget);
            if batch.is_empty() {
                let head_cost = costs[0];
                warn!(
                    "task with estimated cost {} exceeds the remaining memory budget {}, \
                     running it alone",
                    head_cost, budget
                );
                batch = vec![0];
            }

            let taken: Vec<ExecutorTask<'a>> = batch
                .into_iter()
                .map(|k| pending[live[k]].take().expect("task taken twice"))
                .collect();

            let results = parallelism.maybe_par_map(taken, |task| (task.body)());
            for result in results {
                result?;
            }
        }

        Ok(())
    }
}

/// Greedy arrival-order batch admission: walk the costs, take each task that
/// still fits the remaining budget, skip the rest. Returns positions into
/// `costs`; empty when not even the first task fits.
pub(crate) fn plan_batch(costs: &[u64], budget: u64) -> Vec<usize> {
    let mut remaining = budget;
    let mut batch = Vec::new();
    for (i, &cost) in costs.iter().enumerate() {
        if cost <= remaining {
            remaining -= cost;
            batch.push(i);
        }
    }
    batch
}

/// Current resident set size in bytes, if the platform exposes it.
#[cfg(target_os = "linux")]
pub fn resident_memory_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4096)
}

/// Current resident set size in bytes, if the platform exposes it.
#[cfg(not(target_os = "linux"))]
pub fn resident_memory_bytes() -> Option<u64> {
    None
}
