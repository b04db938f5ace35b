use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when building graphs or driving a worker through a step.
///
/// Contract violations of the handshake itself (popping from an empty queue, a relay whose
/// outputs do not alias its inputs, an unknown event id) are not represented here. They are
/// programming errors and panic immediately.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The graph definition is not executable.
    #[error("invalid graph: {reason}")]
    InvalidGraph {
        /// A human-readable description of the problem.
        reason: String,
    },

    /// A graph was run with a different number of inputs than it declares.
    #[error("graph expects {expected} inputs but {actual} were provided")]
    InputCount {
        /// Number of inputs the graph declares.
        expected: usize,

        /// Number of inputs provided to the run.
        actual: usize,
    },

    /// An operator returned without binding one of its declared outputs.
    #[error("node '{node}' did not produce a value for output {output}")]
    MissingOutput {
        /// Name of the operator that failed to produce the output.
        node: String,

        /// Position of the missing output.
        output: usize,
    },

    /// An operator reported a failure of its own.
    #[error("node '{node}' failed: {message}")]
    Operator {
        /// Name of the failing operator.
        node: String,

        /// The failure as reported by the operator.
        message: String,
    },

    /// A worker was started while the worker from a previous step was still attached.
    #[error("a worker is already running; join it before starting another")]
    WorkerAlreadyRunning,

    /// An orchestrator operation required a worker but none was started.
    #[error("no worker has been started")]
    NoWorker,

    /// The worker did not reach its suspension point within the configured timeout.
    #[error("worker did not suspend within {timeout:?}")]
    SuspendTimedOut {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The worker ran the whole graph without passing through a suspension point.
    #[error("worker finished without reaching a suspension point")]
    NoSuspension,

    /// The worker thread panicked.
    #[error("worker panicked: {message}")]
    WorkerPanicked {
        /// The panic payload, if it was a string.
        message: String,
    },

    /// The operating system refused to start the worker thread.
    #[error("failed to spawn worker thread")]
    ThreadSpawn(#[source] io::Error),
}

/// A specialized `Result` type for graph execution and orchestration, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
