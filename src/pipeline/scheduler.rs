use crate::error::{PipelineError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

/// Bounded pool shared by extraction and stage tasks.
///
/// The pool holds one permit per thread of the budget. A task acquires as many
/// permits as threads it will use, so the sum of threads handed to running
/// jobs never exceeds the budget.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    budget: u32,
}

impl WorkerPool {
    pub fn new(budget: usize) -> Self {
        let budget = budget.clamp(1, u32::MAX as usize) as u32;
        Self {
            permits: Arc::new(Semaphore::new(budget as usize)),
            budget,
        }
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Thread count a job asking for `threads` will actually receive.
    pub fn job_cost(&self, threads: usize) -> u32 {
        (threads.min(u32::MAX as usize) as u32).clamp(1, self.budget)
    }

    /// Single submission point: spawn `fut` once `cost` permits are held.
    ///
    /// The task fails with `PipelineError::Task` instead of running if the pool
    /// has been closed.
    pub fn submit<F, T>(&self, cost: u32, fut: F) -> JoinHandle<Result<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let cost = cost.clamp(1, self.budget);
        tokio::spawn(async move {
            let _permit = permits
                .acquire_many_owned(cost)
                .await
                .map_err(|e| PipelineError::Task(format!("worker pool closed: {}", e)))?;
            debug!("Acquired {} worker permit(s)", cost);
            Ok::<T, PipelineError>(fut.await)
        })
    }
}

/// Wait for every handle in submission order. This is the barrier between
/// marker tasks and concatenation.
pub async fn join_all<T>(handles: Vec<JoinHandle<Result<T>>>) -> Result<Vec<T>> {
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let value = handle
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))??;
        results.push(value);
    }
    Ok(results)
}
