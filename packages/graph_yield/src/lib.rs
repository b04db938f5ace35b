#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Suspends a compute graph pass on a worker thread, hands intermediate values to an
//! orchestrating thread and resumes with the values it supplies.
//!
//! This lets one graph be split into two halves - for example a forward and a backward pass -
//! with an externally computed step (such as an optimizer update) injected in between, without
//! the graph executor knowing anything about threads.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use graph_yield::{FnOperator, Graph, Session, SuspensionPoint, Value};
//!
//! fn number(value: &Value) -> f64 {
//!     value.downcast_ref::<f64>().copied().unwrap_or_default()
//! }
//!
//! // Forward: yield A and B. Backward: receive C and add one.
//! let mut builder = Graph::builder();
//! let a = builder.input();
//! let b = builder.input();
//! let c = builder.node(SuspensionPoint::new(), &[a, b], 1);
//! let result = builder.node(
//!     FnOperator::new("add_one", |inputs| vec![Value::new(number(&inputs[0]) + 1.0)]),
//!     &[c[0]],
//!     1,
//! );
//! builder.output(result[0]);
//! let graph = Arc::new(builder.build().unwrap());
//!
//! let mut session = Session::new();
//! let outcome = session
//!     .run_step(graph, vec![Value::new(2.0_f64), Value::new(3.0_f64)], |yielded| {
//!         let c = number(&yielded[0]) * number(&yielded[1]);
//!         Some(vec![Value::new(c)])
//!     })
//!     .unwrap();
//!
//! let outputs = outcome.into_outputs().unwrap();
//! assert_eq!(number(&outputs[0]), 7.0);
//! ```
//!
//! # The handshake
//!
//! The worker and the orchestrator rendezvous through two events and one queue, all owned by
//! a [`Handshake`]:
//!
//! 1. The worker pushes the [`SuspensionPoint`]'s inputs onto the queue.
//! 2. The worker resets its own event ([`EventId::WORKER`]). This must happen before it
//!    announces the suspension, or a resume signal could be lost.
//! 3. The worker signals the orchestrator's event ([`EventId::MAIN`]).
//! 4. The worker waits for [`EventId::WORKER`] and clears it once observed.
//! 5. If termination was requested, the worker stops the graph run without outputs.
//! 6. Otherwise it pops one value per output from the queue and continues.
//!
//! The orchestrator must push exactly as many values as the suspension point has outputs.
//! This is a caller contract: too few values make the worker panic, too many are left behind
//! and discarded (with a warning) before the next run.
//!
//! # Other operators
//!
//! - [`Barrier`] outputs `true` once all of its inputs are available, to order nodes without
//!   data flow.
//! - [`Relay`] forwards its inputs as outputs without copying them.
//!
//! # Logging
//!
//! The crate emits [`tracing`] events: worker lifecycle and suspend/resume at debug level,
//! event traffic at trace level and a warning when a worker resumes under termination.

mod barrier;
mod error;
mod event;
mod event_pool;
mod graph;
mod handshake;
mod message_queue;
mod relay;
mod session;
mod suspension_point;
mod value;

pub use barrier::*;
pub use error::*;
pub use event::*;
pub use event_pool::*;
pub use graph::*;
pub use handshake::*;
pub use message_queue::*;
pub use relay::*;
pub use session::*;
pub use suspension_point::*;
pub use value::*;
