//! Orchestrator side: launching workers and driving them through a suspension.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle as ThreadJoinHandle};
use std::time::Duration;

use rsevents::{Awaitable, EventState, ManualResetEvent};
use scopeguard::defer;
use tracing::{debug, warn};

use crate::{Error, Graph, Handshake, Result, RunContext, RunOutcome, Value};

const DEFAULT_WORKER_THREAD_NAME: &str = "graph-yield-worker";

/// How often a dropped session re-sends the resume signal while waiting for its worker to
/// observe the termination request.
const DROP_RESUME_INTERVAL: Duration = Duration::from_millis(10);

struct Worker {
    thread: ThreadJoinHandle<Result<RunOutcome>>,
    exited: Arc<ManualResetEvent>,
}

/// Runs a graph on a worker thread and exchanges values with it at its suspension point.
///
/// A session owns the handshake state shared with its worker. It drives one worker at a
/// time; each worker performs one full graph run (one step), suspending at most once.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use graph_yield::{FnOperator, Graph, Session, SuspensionPoint, Value};
///
/// let mut builder = Graph::builder();
/// let x = builder.input();
/// let grad = builder.node(SuspensionPoint::new(), &[x], 1);
/// let applied = builder.node(
///     FnOperator::new("apply", |inputs| vec![inputs[0].clone()]),
///     &[grad[0]],
///     1,
/// );
/// builder.output(applied[0]);
/// let graph = Arc::new(builder.build().unwrap());
///
/// let mut session = Session::new();
/// session.start_worker(Arc::clone(&graph), vec![Value::new(3.0_f32)]).unwrap();
///
/// session.wait_for_suspend().unwrap();
/// let yielded = session.drain_yielded_values();
/// let x = yielded[0].downcast_ref::<f32>().copied().unwrap();
///
/// session.supply_resume_values(vec![Value::new(x * 2.0)]);
/// session.signal_resume();
///
/// let outputs = session.join_worker().unwrap().into_outputs().unwrap();
/// assert_eq!(outputs[0].downcast_ref::<f32>(), Some(&6.0));
/// ```
pub struct Session {
    handshake: Arc<Handshake<Value>>,
    worker_thread_name: String,
    suspend_timeout: Option<Duration>,
    worker: Option<Worker>,
}

impl Session {
    /// Creates a session with default settings.
    ///
    /// Use [`Session::builder()`] for custom configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring the session.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// The handshake shared with the worker.
    #[must_use]
    pub fn handshake(&self) -> &Arc<Handshake<Value>> {
        &self.handshake
    }

    /// Whether a worker has been started and not yet joined.
    #[must_use]
    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Starts a worker thread that runs `graph` with `inputs` and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerAlreadyRunning`] if the previous worker has not been joined, or
    /// [`Error::ThreadSpawn`] if the thread could not be created.
    pub fn start_worker(&mut self, graph: Arc<Graph>, inputs: Vec<Value>) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::WorkerAlreadyRunning);
        }

        self.handshake.prepare_run();

        let run = RunContext::with_handshake(Arc::clone(&self.handshake));
        let exited = Arc::new(ManualResetEvent::new(EventState::Unset));

        let thread = thread::Builder::new()
            .name(self.worker_thread_name.clone())
            .spawn({
                let exited = Arc::clone(&exited);

                move || {
                    // Runs on unwind as well, so an orchestrator waiting for a suspension
                    // is always released.
                    defer! {
                        run.handshake().mark_worker_exited();
                        exited.set();
                    }

                    debug!("worker thread started");
                    let outcome = graph.run(&run, inputs);
                    debug!(ok = outcome.is_ok(), "worker thread exiting");

                    outcome
                }
            })
            .map_err(Error::ThreadSpawn)?;

        self.worker = Some(Worker { thread, exited });

        Ok(())
    }

    /// Blocks until the worker has suspended.
    ///
    /// If a suspend timeout is configured, gives up once it elapses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoWorker`] if no worker was started and
    /// [`Error::SuspendTimedOut`] if the timeout elapsed. If the worker exited instead of
    /// suspending, it is joined and its failure is returned, or [`Error::NoSuspension`] if
    /// the run itself succeeded.
    pub fn wait_for_suspend(&mut self) -> Result<()> {
        if self.worker.is_none() {
            return Err(Error::NoWorker);
        }

        match self.suspend_timeout {
            Some(timeout) => {
                if !self.handshake.wait_for_suspend_timeout(timeout) {
                    return Err(Error::SuspendTimedOut { timeout });
                }
            }
            None => self.handshake.wait_for_suspend(),
        }

        if self.handshake.has_worker_exited() {
            self.join_worker()?;
            return Err(Error::NoSuspension);
        }

        Ok(())
    }

    /// Takes the values the suspended worker yielded, in the order it yielded them.
    #[must_use]
    pub fn drain_yielded_values(&self) -> Vec<Value> {
        self.handshake.drain_yielded()
    }

    /// Queues the values that become the suspension point's outputs, in output order.
    ///
    /// Exactly one value per output of the suspension point must be supplied before
    /// [`signal_resume()`][Self::signal_resume].
    pub fn supply_resume_values(&self, values: Vec<Value>) {
        self.handshake.supply_resume_values(values);
    }

    /// Releases the suspended worker so it continues with the supplied values.
    pub fn signal_resume(&self) {
        self.handshake.signal_resume();
    }

    /// Releases the suspended worker and asks it to stop without producing outputs.
    pub fn signal_terminate_and_resume(&self) {
        self.handshake.signal_terminate_and_resume();
    }

    /// Waits for the worker to finish and returns the outcome of its graph run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoWorker`] if no worker was started, [`Error::WorkerPanicked`] if the
    /// worker panicked, or the error the graph run failed with.
    pub fn join_worker(&mut self) -> Result<RunOutcome> {
        let worker = self.worker.take().ok_or(Error::NoWorker)?;

        match worker.thread.join() {
            Ok(outcome) => outcome,
            Err(payload) => Err(Error::WorkerPanicked {
                message: format_panic_payload(&payload),
            }),
        }
    }

    /// Blocks until the worker thread has finished or `timeout` elapses, without joining it.
    ///
    /// Returns `true` if there is no running worker.
    #[must_use]
    pub fn wait_for_worker_exit_timeout(&self, timeout: Duration) -> bool {
        self.worker
            .as_ref()
            .is_none_or(|worker| worker.exited.wait_for(timeout))
    }

    /// Runs one full step: starts a worker, waits for it to suspend, hands the yielded values
    /// to `exchange` and joins the worker.
    ///
    /// If `exchange` returns replacement values, the worker resumes with them. If it returns
    /// [`None`], the worker is asked to terminate.
    ///
    /// # Errors
    ///
    /// Returns any error of [`start_worker()`][Self::start_worker],
    /// [`wait_for_suspend()`][Self::wait_for_suspend] or
    /// [`join_worker()`][Self::join_worker].
    pub fn run_step<F>(
        &mut self,
        graph: Arc<Graph>,
        inputs: Vec<Value>,
        exchange: F,
    ) -> Result<RunOutcome>
    where
        F: FnOnce(Vec<Value>) -> Option<Vec<Value>>,
    {
        self.start_worker(graph, inputs)?;
        self.wait_for_suspend()?;

        match exchange(self.drain_yielded_values()) {
            Some(values) => {
                self.supply_resume_values(values);
                self.signal_resume();
            }
            None => self.signal_terminate_and_resume(),
        }

        self.join_worker()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("handshake", &self.handshake)
            .field("worker_thread_name", &self.worker_thread_name)
            .field("suspend_timeout", &self.suspend_timeout)
            .field("has_worker", &self.worker.is_some())
            .finish()
    }
}

impl Drop for Session {
    #[cfg_attr(test, mutants::skip)] // Removing this causes timeouts (workers never stop).
    fn drop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        // The worker may not have reached its suspension point yet, in which case it clears
        // its own latch before waiting. We keep re-sending the resume signal until it exits.
        self.handshake.request_termination();

        while !worker.exited.wait_for(DROP_RESUME_INTERVAL) {
            self.handshake.signal_resume();
        }

        if let Err(payload) = worker.thread.join() {
            warn!(
                panic_message = %format_panic_payload(&payload),
                "worker panicked but the session was dropped without joining it"
            );
        }
    }
}

/// Builder for configuring a [`Session`].
#[derive(Debug)]
pub struct SessionBuilder {
    worker_thread_name: String,
    suspend_timeout: Option<Duration>,
}

impl SessionBuilder {
    fn new() -> Self {
        Self {
            worker_thread_name: DEFAULT_WORKER_THREAD_NAME.to_string(),
            suspend_timeout: None,
        }
    }

    /// Sets the name given to worker threads.
    ///
    /// Default is `graph-yield-worker`.
    #[must_use]
    pub fn worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker_thread_name = name.into();
        self
    }

    /// Sets how long [`Session::wait_for_suspend()`] waits before giving up.
    ///
    /// By default it waits indefinitely.
    #[must_use]
    pub fn suspend_timeout(mut self, timeout: Duration) -> Self {
        self.suspend_timeout = Some(timeout);
        self
    }

    /// Builds the session with the configured settings.
    #[must_use]
    pub fn build(self) -> Session {
        Session {
            handshake: Arc::new(Handshake::new()),
            worker_thread_name: self.worker_thread_name,
            suspend_timeout: self.suspend_timeout,
            worker: None,
        }
    }
}

/// Formats a panic payload for errors and logs.
fn format_panic_payload(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use static_assertions::assert_impl_all;
    use testing::with_watchdog;

    use super::*;
    use crate::{FnOperator, SuspensionPoint};

    assert_impl_all!(Session: Send);

    fn yielding_graph() -> Arc<Graph> {
        let mut builder = Graph::builder();
        let x = builder.input();
        let replaced = builder.node(SuspensionPoint::new(), &[x], 1);
        builder.output(replaced[0]);
        Arc::new(builder.build().unwrap())
    }

    #[test]
    fn builder_applies_configuration() {
        let session = Session::builder()
            .worker_thread_name("step-runner")
            .suspend_timeout(Duration::from_secs(3))
            .build();

        assert_eq!(session.worker_thread_name, "step-runner");
        assert_eq!(session.suspend_timeout, Some(Duration::from_secs(3)));
        assert!(!session.has_worker());
    }

    #[test]
    fn operations_without_worker_fail() {
        let mut session = Session::new();

        assert!(matches!(session.wait_for_suspend(), Err(Error::NoWorker)));
        assert!(matches!(session.join_worker(), Err(Error::NoWorker)));
        assert!(session.wait_for_worker_exit_timeout(Duration::ZERO));
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn worker_thread_carries_configured_name() {
        with_watchdog(|| {
            let mut builder = Graph::builder();
            let name = builder.node(
                FnOperator::new("thread_name", |_| {
                    let name = thread::current().name().map(str::to_string);
                    vec![Value::new(name)]
                }),
                &[],
                1,
            );
            builder.output(name[0]);
            let graph = Arc::new(builder.build().unwrap());

            let mut session = Session::builder().worker_thread_name("named-worker").build();
            session.start_worker(graph, vec![]).unwrap();

            let outputs = session.join_worker().unwrap().into_outputs().unwrap();

            assert_eq!(
                outputs[0].downcast_ref::<Option<String>>(),
                Some(&Some("named-worker".to_string()))
            );
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn second_worker_requires_join() {
        with_watchdog(|| {
            let graph = yielding_graph();
            let mut session = Session::new();

            session
                .start_worker(Arc::clone(&graph), vec![Value::new(1)])
                .unwrap();

            assert!(matches!(
                session.start_worker(graph, vec![Value::new(1)]),
                Err(Error::WorkerAlreadyRunning)
            ));

            session.wait_for_suspend().unwrap();
            _ = session.drain_yielded_values();
            session.signal_terminate_and_resume();

            assert!(session.join_worker().unwrap().is_terminated());
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn exit_wait_observes_finished_worker() {
        with_watchdog(|| {
            let graph = Arc::new(Graph::builder().build().unwrap());
            let mut session = Session::new();

            session.start_worker(graph, vec![]).unwrap();

            while !session.wait_for_worker_exit_timeout(Duration::from_millis(10)) {}

            assert!(session.has_worker());
            assert!(session.join_worker().is_ok());
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn drop_releases_suspended_worker() {
        with_watchdog(|| {
            let graph = yielding_graph();
            let mut session = Session::new();

            session.start_worker(graph, vec![Value::new(1)]).unwrap();
            session.wait_for_suspend().unwrap();

            drop(session);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn drop_releases_worker_that_has_not_suspended_yet() {
        with_watchdog(|| {
            let graph = yielding_graph();
            let mut session = Session::new();

            session.start_worker(graph, vec![Value::new(1)]).unwrap();

            drop(session);
        });
    }

    #[test]
    fn panic_payload_formats_strings() {
        let static_str = panic::catch_unwind(|| panic!("static message")).unwrap_err();
        let owned = panic::catch_unwind(AssertUnwindSafe(|| {
            panic!("{} message", "formatted");
        }))
        .unwrap_err();
        let other = panic::catch_unwind(|| panic::panic_any(42_u32)).unwrap_err();

        assert_eq!(format_panic_payload(&static_str), "static message");
        assert_eq!(format_panic_payload(&owned), "formatted message");
        assert_eq!(format_panic_payload(&other), "unknown panic payload");
    }
}
