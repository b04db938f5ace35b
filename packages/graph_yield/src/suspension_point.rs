use crate::{Flow, OpContext, Operator, Result, Resumption};

/// Operator that hands its inputs to the orchestrating thread and blocks until it receives
/// replacement values for its outputs.
///
/// Splits a graph run into two halves: everything before this node runs, the orchestrator
/// inspects the yielded values (for example a loss) and computes whatever it needs to, then
/// the values it supplies become this node's outputs and the rest of the graph runs.
///
/// If the orchestrator requests termination instead, the node produces no outputs and stops
/// the run.
///
/// The operator holds no state. All handshake state lives in the
/// [`RunContext`][crate::RunContext], so the operator may be constructed anew for every run.
#[derive(Clone, Copy, Debug, Default)]
pub struct SuspensionPoint;

impl SuspensionPoint {
    /// Creates the operator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Operator for SuspensionPoint {
    fn name(&self) -> &str {
        "suspension_point"
    }

    fn suspends(&self) -> bool {
        true
    }

    fn compute(&self, ctx: &mut OpContext<'_>) -> Result<Flow> {
        let handshake = ctx.run_context().handshake();

        match handshake.suspend(ctx.inputs().iter().cloned(), ctx.output_count()) {
            Resumption::Terminated => Ok(Flow::Stop),
            Resumption::Resumed(values) => {
                for (index, value) in values.into_iter().enumerate() {
                    ctx.set_output(index, value);
                }

                Ok(Flow::Continue)
            }
        }
    }
}
