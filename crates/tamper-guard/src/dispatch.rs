use std::io;
use std::sync::mpsc;
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Serializes host-registry queries onto one dedicated thread.
///
/// Some handler registries only answer on a specific execution context;
/// callers elsewhere submit the query and block until it completes there.
pub struct QueryContext {
    jobs: mpsc::Sender<Job>,
    worker: thread::ThreadId,
}

impl QueryContext {
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (jobs, inbox) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name(format!("tamper-guard-{}", name))
            .spawn(move || {
                while let Ok(job) = inbox.recv() {
                    job();
                }
            })?;
        Ok(Self {
            jobs,
            worker: handle.thread().id(),
        })
    }

    /// Runs `query` on the dedicated thread and blocks on a one-shot
    /// completion signal. Executes inline when the caller is already on that
    /// thread. Returns `None` when the worker is gone.
    pub fn run<T, F>(&self, query: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if thread::current().id() == self.worker {
            return Some(query());
        }

        let (done, wait) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let _ = done.send(query());
        });
        if self.jobs.send(job).is_err() {
            return None;
        }
        wait.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn returns_the_query_result() {
        let context = QueryContext::spawn("test").expect("spawn worker");
        assert_eq!(context.run(|| 21 * 2), Some(42));
    }

    #[test]
    fn executes_on_the_dedicated_thread() {
        let context = QueryContext::spawn("test").expect("spawn worker");
        let caller = thread::current().id();
        let ran_on = context.run(|| thread::current().id()).expect("query ran");
        assert_ne!(ran_on, caller);
    }

    #[test]
    fn reentrant_queries_run_inline_without_deadlock() {
        let context = Arc::new(QueryContext::spawn("test").expect("spawn worker"));
        let inner = Arc::clone(&context);
        let nested = context.run(move || inner.run(|| 7).unwrap_or(0));
        assert_eq!(nested, Some(7));
    }

    #[test]
    fn sequential_queries_reuse_the_same_worker() {
        let context = QueryContext::spawn("test").expect("spawn worker");
        let first = context.run(|| thread::current().id()).expect("first query");
        let second = context.run(|| thread::current().id()).expect("second query");
        assert_eq!(first, second);
    }
}
