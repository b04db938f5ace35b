//! A minimal sequential graph executor that hosts operators.
//!
//! Nodes execute in the order they were added to the [`GraphBuilder`], which is always a valid
//! topological order because building rejects a node that reads a slot created after it.
//! Every run is driven by a [`RunContext`] that carries the handshake a suspending operator talks to.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::{Error, Handshake, Result, Value};

/// Whether graph execution continues after an operator returns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    /// All declared outputs have been bound; execute the next node.
    Continue,

    /// Stop the run without producing graph outputs.
    Stop,
}

/// Result of a graph run that did not fail.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every node executed. Contains the graph outputs in declaration order.
    Completed(Vec<Value>),

    /// An operator stopped the run early, typically because termination was requested.
    Terminated,
}

impl RunOutcome {
    /// The graph outputs if the run completed.
    #[must_use]
    pub fn into_outputs(self) -> Option<Vec<Value>> {
        match self {
            Self::Completed(outputs) => Some(outputs),
            Self::Terminated => None,
        }
    }

    /// Whether the run was stopped early.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Per-run state shared by every operator of one graph execution.
#[derive(Clone, Debug)]
pub struct RunContext {
    handshake: Arc<Handshake<Value>>,
}

impl RunContext {
    /// Creates a context with a handshake of its own, for runs without an orchestrator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_handshake(Arc::new(Handshake::new()))
    }

    /// Creates a context that suspends through the given handshake.
    #[must_use]
    pub fn with_handshake(handshake: Arc<Handshake<Value>>) -> Self {
        Self { handshake }
    }

    /// The handshake used by suspending operators in this run.
    #[must_use]
    pub fn handshake(&self) -> &Handshake<Value> {
        &self.handshake
    }

    /// Whether the orchestrator has asked this run to stop.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.handshake.is_terminating()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A computation that can be placed in a [`Graph`].
///
/// Operators are stateless with respect to a run: any state that must survive between
/// invocations lives in the [`RunContext`].
pub trait Operator: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Whether output `i` must be the same buffer as input `i`.
    ///
    /// When this returns `true`, the executor binds every output to its input before calling
    /// [`compute()`][Self::compute]. The operator must then have as many outputs as inputs.
    fn aliases_inputs(&self) -> bool {
        false
    }

    /// Whether executing the operator hands control to the orchestrating thread.
    ///
    /// A graph may contain at most one such node, because a worker suspends once per run.
    fn suspends(&self) -> bool {
        false
    }

    /// Checks whether the operator supports the given number of inputs and outputs.
    ///
    /// Called once when the graph is built.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGraph`] describing the problem if the arity is not supported.
    fn validate(&self, input_count: usize, output_count: usize) -> Result<()> {
        _ = (input_count, output_count);
        Ok(())
    }

    /// Executes the operator.
    ///
    /// Unless [`Flow::Stop`] is returned, every output must be bound before returning.
    fn compute(&self, ctx: &mut OpContext<'_>) -> Result<Flow>;
}

/// The view of one node invocation that an [`Operator`] works with.
pub struct OpContext<'a> {
    node: &'a str,
    inputs: &'a [Value],
    outputs: Vec<Option<Value>>,
    run: &'a RunContext,
}

impl<'a> OpContext<'a> {
    pub(crate) fn new(
        node: &'a str,
        inputs: &'a [Value],
        outputs: Vec<Option<Value>>,
        run: &'a RunContext,
    ) -> Self {
        Self {
            node,
            inputs,
            outputs,
            run,
        }
    }

    /// Number of inputs of this node.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of outputs of this node.
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// The input at `index`, if the node has that many inputs.
    #[must_use]
    pub fn input(&self, index: usize) -> Option<&Value> {
        self.inputs.get(index)
    }

    /// All inputs in declaration order.
    #[must_use]
    pub fn inputs(&self) -> &'a [Value] {
        self.inputs
    }

    /// The value currently bound to output `index`, if any.
    ///
    /// For operators that alias their inputs, this is the buffer the executor pre-bound.
    #[must_use]
    pub fn output(&self, index: usize) -> Option<&Value> {
        self.outputs.get(index).and_then(Option::as_ref)
    }

    /// Binds `value` to output `index`.
    ///
    /// # Panics
    ///
    /// Panics if the node has no output at `index`.
    pub fn set_output(&mut self, index: usize, value: Value) {
        let output_count = self.outputs.len();
        let slot = self.outputs.get_mut(index).unwrap_or_else(|| {
            panic!("output {index} is out of range for a node with {output_count} outputs")
        });

        *slot = Some(value);
    }

    /// The context of the run this invocation belongs to.
    #[must_use]
    pub fn run_context(&self) -> &'a RunContext {
        self.run
    }

    /// Creates an error attributed to this node.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::Operator {
            node: self.node.to_string(),
            message: message.into(),
        }
    }

    fn into_outputs(self) -> Vec<Option<Value>> {
        self.outputs
    }
}

impl fmt::Debug for OpContext<'_> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("node", &self.node)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// Identifies a value slot in a graph under construction.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SlotId(usize);

struct Node {
    op: Box<dyn Operator>,
    inputs: Vec<SlotId>,
    outputs: Vec<SlotId>,

    // Slots that existed when the node was added. Its inputs must be among them.
    visible_slots: usize,
}

impl fmt::Debug for Node {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("op", &self.op.name())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("visible_slots", &self.visible_slots)
            .finish()
    }
}

/// An executable graph of operators.
///
/// Graphs are immutable once built and can be shared between threads, so the same graph
/// can be run by one worker per step.
///
/// # Example
///
/// ```rust
/// use graph_yield::{FnOperator, Graph, RunContext, Value};
///
/// let mut builder = Graph::builder();
/// let x = builder.input();
/// let doubled = builder.node(
///     FnOperator::new("double", |inputs| {
///         let x = inputs[0].downcast_ref::<i32>().copied().unwrap_or_default();
///         vec![Value::new(x * 2)]
///     }),
///     &[x],
///     1,
/// );
/// builder.output(doubled[0]);
/// let graph = builder.build().unwrap();
///
/// let outputs = graph
///     .run(&RunContext::new(), vec![Value::new(21)])
///     .unwrap()
///     .into_outputs()
///     .unwrap();
///
/// assert_eq!(outputs[0].downcast_ref::<i32>(), Some(&42));
/// ```
#[derive(Debug)]
pub struct Graph {
    slot_count: usize,
    inputs: Vec<SlotId>,
    nodes: Vec<Node>,
    outputs: Vec<SlotId>,
}

impl Graph {
    /// Creates a builder for a new graph.
    #[must_use]
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Number of inputs the graph expects.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Executes every node in order on the calling thread.
    ///
    /// If a node suspends, this blocks until the orchestrator behind `run` resumes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the input count does not match, if an operator fails or if an
    /// operator does not bind all of its outputs.
    pub fn run(&self, run: &RunContext, inputs: Vec<Value>) -> Result<RunOutcome> {
        if inputs.len() != self.inputs.len() {
            return Err(Error::InputCount {
                expected: self.inputs.len(),
                actual: inputs.len(),
            });
        }

        let mut slots: Vec<Option<Value>> = vec![None; self.slot_count];

        for (slot, value) in self.inputs.iter().zip(inputs) {
            bind(&mut slots, *slot, value);
        }

        for node in &self.nodes {
            let name = node.op.name();

            let node_inputs = node
                .inputs
                .iter()
                .map(|slot| read(&slots, *slot, name))
                .collect::<Result<Vec<_>>>()?;

            let prebound = if node.op.aliases_inputs() {
                node_inputs.iter().cloned().map(Some).collect()
            } else {
                vec![None; node.outputs.len()]
            };

            let mut ctx = OpContext::new(name, &node_inputs, prebound, run);

            trace!(node = name, "executing node");

            if node.op.compute(&mut ctx)? == Flow::Stop {
                debug!(node = name, "node stopped the run");
                return Ok(RunOutcome::Terminated);
            }

            for (output, (slot, value)) in node.outputs.iter().zip(ctx.into_outputs()).enumerate() {
                let value = value.ok_or_else(|| Error::MissingOutput {
                    node: name.to_string(),
                    output,
                })?;

                bind(&mut slots, *slot, value);
            }
        }

        let outputs = self
            .outputs
            .iter()
            .map(|slot| read(&slots, *slot, "graph output"))
            .collect::<Result<Vec<_>>>()?;

        Ok(RunOutcome::Completed(outputs))
    }
}

fn bind(slots: &mut [Option<Value>], slot: SlotId, value: Value) {
    // Slot ids are validated when the graph is built.
    if let Some(target) = slots.get_mut(slot.0) {
        *target = Some(value);
    }
}

fn read(slots: &[Option<Value>], slot: SlotId, reader: &str) -> Result<Value> {
    slots
        .get(slot.0)
        .and_then(Option::clone)
        .ok_or_else(|| Error::InvalidGraph {
            reason: format!("'{reader}' reads slot {} before it is written", slot.0),
        })
}

/// Builder for a [`Graph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    slot_count: usize,
    inputs: Vec<SlotId>,
    nodes: Vec<Node>,
    outputs: Vec<SlotId>,
}

impl GraphBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Declares the next graph input and returns the slot it is bound to.
    pub fn input(&mut self) -> SlotId {
        let slot = self.allocate_slot();
        self.inputs.push(slot);
        slot
    }

    /// Appends a node that consumes `inputs` and produces `output_count` new slots.
    ///
    /// Returns the output slots in output order.
    pub fn node<O>(&mut self, op: O, inputs: &[SlotId], output_count: usize) -> Vec<SlotId>
    where
        O: Operator + 'static,
    {
        let visible_slots = self.slot_count;

        let outputs = (0..output_count)
            .map(|_| self.allocate_slot())
            .collect::<Vec<_>>();

        self.nodes.push(Node {
            op: Box::new(op),
            inputs: inputs.to_vec(),
            outputs: outputs.clone(),
            visible_slots,
        });

        outputs
    }

    /// Declares `slot` as the next graph output.
    pub fn output(&mut self, slot: SlotId) -> &mut Self {
        self.outputs.push(slot);
        self
    }

    /// Validates the graph and makes it executable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGraph`] if a node reads a slot that did not exist when the node
    /// was added, if more than one node suspends or if an operator rejects its input/output
    /// arity.
    pub fn build(self) -> Result<Graph> {
        let mut suspending: Option<&str> = None;

        for node in &self.nodes {
            let name = node.op.name();

            if !node.inputs.iter().all(|slot| slot.0 < node.visible_slots) {
                return Err(invalid(format!(
                    "node '{name}' reads a slot that is not written before it"
                )));
            }

            if node.op.suspends() {
                if let Some(first) = suspending {
                    return Err(invalid(format!(
                        "node '{name}' suspends but '{first}' already does; a run suspends once"
                    )));
                }

                suspending = Some(name);
            }

            if node.op.aliases_inputs() && node.inputs.len() != node.outputs.len() {
                return Err(invalid(format!(
                    "node '{name}' aliases its inputs but has {} inputs and {} outputs",
                    node.inputs.len(),
                    node.outputs.len()
                )));
            }

            node.op.validate(node.inputs.len(), node.outputs.len())?;
        }

        if !self.outputs.iter().all(|slot| slot.0 < self.slot_count) {
            return Err(invalid("graph output refers to a slot of another graph".to_string()));
        }

        Ok(Graph {
            slot_count: self.slot_count,
            inputs: self.inputs,
            nodes: self.nodes,
            outputs: self.outputs,
        })
    }

    fn allocate_slot(&mut self) -> SlotId {
        let slot = SlotId(self.slot_count);
        self.slot_count = self
            .slot_count
            .checked_add(1)
            .expect("slot count overflow is not supported");
        slot
    }
}

fn invalid(reason: String) -> Error {
    Error::InvalidGraph { reason }
}

type OperatorFn = dyn Fn(&[Value]) -> std::result::Result<Vec<Value>, String> + Send + Sync;

/// An [`Operator`] backed by a closure that maps inputs to outputs.
pub struct FnOperator {
    name: String,
    body: Box<OperatorFn>,
}

impl FnOperator {
    /// Creates an operator from an infallible closure.
    ///
    /// The closure must return exactly as many values as the node has outputs.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Vec<Value> + Send + Sync + 'static,
    {
        Self::fallible(name, move |inputs| Ok(body(inputs)))
    }

    /// Creates an operator from a closure that may fail with a message.
    pub fn fallible<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Vec<Value>, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

impl fmt::Debug for FnOperator {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Operator for FnOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, ctx: &mut OpContext<'_>) -> Result<Flow> {
        let outputs = (self.body)(ctx.inputs()).map_err(|message| ctx.error(message))?;

        if outputs.len() != ctx.output_count() {
            return Err(ctx.error(format!(
                "produced {} values for {} outputs",
                outputs.len(),
                ctx.output_count()
            )));
        }

        for (index, value) in outputs.into_iter().enumerate() {
            ctx.set_output(index, value);
        }

        Ok(Flow::Continue)
    }
}
