use crate::{Error, Flow, OpContext, Operator, Result, Value};

/// Operator that outputs `true` once all of its inputs are available.
///
/// The inputs are not inspected. The node exists to create an ordering edge: anything that
/// consumes its output runs after everything that produces its inputs.
#[derive(Clone, Copy, Debug, Default)]
pub struct Barrier;

impl Barrier {
    /// Creates the operator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Operator for Barrier {
    fn name(&self) -> &str {
        "barrier"
    }

    fn validate(&self, _input_count: usize, output_count: usize) -> Result<()> {
        if output_count == 1 {
            Ok(())
        } else {
            Err(Error::InvalidGraph {
                reason: format!("a barrier has exactly one output, not {output_count}"),
            })
        }
    }

    fn compute(&self, ctx: &mut OpContext<'_>) -> Result<Flow> {
        ctx.set_output(0, Value::new(true));
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{Graph, RunContext};

    #[test]
    fn outputs_true_after_any_inputs() {
        let mut builder = Graph::builder();
        let a = builder.input();
        let b = builder.input();
        let done = builder.node(Barrier::new(), &[a, b], 1);
        builder.output(done[0]);
        let graph = builder.build().unwrap();

        let outputs = graph
            .run(
                &RunContext::new(),
                vec![Value::new(false), Value::new("unrelated")],
            )
            .unwrap()
            .into_outputs()
            .unwrap();

        assert_eq!(outputs[0].downcast_ref::<bool>(), Some(&true));
    }

    #[test]
    fn runs_without_inputs() {
        let run = RunContext::new();
        let mut ctx = OpContext::new("barrier", &[], vec![None], &run);

        let flow = Barrier::new().compute(&mut ctx).unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(ctx.output(0).and_then(Value::downcast_ref::<bool>), Some(&true));
    }

    #[test]
    fn rejects_more_than_one_output() {
        let mut builder = Graph::builder();
        builder.node(Barrier::new(), &[], 2);

        assert!(matches!(builder.build(), Err(Error::InvalidGraph { .. })));
    }
}
