use std::sync::{Arc, Condvar, Mutex};

use tracing::error;

use crate::error::{Result, SolexError};

type ErrorHandler = Arc<dyn Fn(&SolexError) + Send + Sync>;

/// A worker pool with structured fan-out.
///
/// `blocking` opens a scope: every task spawned within it is joined before
/// the call returns, which is the only synchronization the pipeline relies
/// on between stages. Task failures are routed to the context-level error
/// handler instead of unwinding.
pub struct ParallelContext {
    pool: rayon::ThreadPool,
    error_handler: Mutex<Option<ErrorHandler>>,
}

impl ParallelContext {
    /// CPU-bound context, one worker per core.
    pub fn cpu_bound() -> Result<Self> {
        Self::with_threads(0)
    }

    /// I/O context: a single worker, serializing file access.
    pub fn io_bound() -> Result<Self> {
        Self::with_threads(1)
    }

    fn with_threads(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| SolexError::Pipeline(e.to_string()))?;
        Ok(Self {
            pool,
            error_handler: Mutex::new(None),
        })
    }

    /// Install the handler invoked when a spawned task returns an error.
    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *self.error_handler.lock().unwrap() = Some(handler);
    }

    /// Run `body` inside a scope; returns once every task spawned through
    /// the scope has completed. Scopes nest.
    ///
    /// `body` runs on the calling thread, so a submission loop blocked on a
    /// semaphore never occupies a pool worker.
    pub fn blocking<'env, R, F>(&'env self, body: F) -> R
    where
        F: for<'scope> FnOnce(&TaskScope<'scope, 'env>) -> R,
    {
        let handler = self.error_handler.lock().unwrap().clone();
        self.pool
            .in_place_scope(move |scope| body(&TaskScope { scope, handler }))
    }
}

/// Handle to an open `blocking` scope.
pub struct TaskScope<'scope, 'env: 'scope> {
    scope: &'scope rayon::Scope<'env>,
    handler: Option<ErrorHandler>,
}

impl<'scope, 'env> TaskScope<'scope, 'env> {
    /// Fire-and-forget task; joined when the enclosing `blocking` returns.
    /// Errors go to the context error handler.
    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() -> Result<()> + Send + 'env,
    {
        let handler = self.handler.clone();
        self.scope.spawn(move |_| {
            if let Err(e) = task() {
                match &handler {
                    Some(h) => h(&e),
                    None => error!(error = %e, "unhandled task failure"),
                }
            }
        });
    }
}

/// Counting semaphore used to throttle task submission.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Semaphore sized to the CPU count, the bound used for the
    /// reconstruction fan-out.
    pub fn cpu_sized() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(cpus)
    }

    pub fn acquire(&self) -> SemaphorePermit<'_> {
        let mut permits = self.permits.lock().unwrap();
        while *permits == 0 {
            permits = self.available.wait(permits).unwrap();
        }
        *permits -= 1;
        SemaphorePermit { semaphore: self }
    }

    fn release(&self) {
        let mut permits = self.permits.lock().unwrap();
        *permits += 1;
        self.available.notify_one();
    }
}

/// Permit released when dropped, so a panicking task cannot leak it.
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn blocking_joins_all_spawned_tasks() {
        let ctx = ParallelContext::cpu_bound().unwrap();
        let counter = AtomicUsize::new(0);
        ctx.blocking(|scope| {
            for _ in 0..64 {
                scope.spawn(|| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
        });
        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn task_errors_reach_the_handler() {
        let ctx = ParallelContext::io_bound().unwrap();
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        ctx.set_error_handler(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        ctx.blocking(|scope| {
            scope.spawn(|| Err(SolexError::EmptySequence));
            scope.spawn(|| Ok(()));
        });
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn semaphore_bounds_concurrency() {
        let ctx = ParallelContext::cpu_bound().unwrap();
        let semaphore = Semaphore::new(2);
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        ctx.blocking(|scope| {
            for _ in 0..32 {
                let permit = semaphore.acquire();
                scope.spawn(|| {
                    let _permit = permit;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(1));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                });
            }
        });
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
