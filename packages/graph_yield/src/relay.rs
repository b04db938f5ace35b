use crate::{Error, Flow, OpContext, Operator, Result, Value};

/// Operator that forwards every input to the output at the same position without copying.
///
/// The executor binds each output to the buffer of the matching input before the operator
/// runs. The operator only verifies that this happened; an output that does not share its
/// input's buffer is a bug in the executor and panics.
#[derive(Clone, Copy, Debug, Default)]
pub struct Relay;

impl Relay {
    /// Creates the operator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Operator for Relay {
    fn name(&self) -> &str {
        "relay"
    }

    fn aliases_inputs(&self) -> bool {
        true
    }

    fn validate(&self, input_count: usize, output_count: usize) -> Result<()> {
        if input_count == 0 {
            return Err(Error::InvalidGraph {
                reason: "a relay needs at least one input".to_string(),
            });
        }

        if input_count != output_count {
            return Err(Error::InvalidGraph {
                reason: format!(
                    "a relay maps inputs to outputs one to one but has {input_count} inputs \
                     and {output_count} outputs"
                ),
            });
        }

        Ok(())
    }

    fn compute(&self, ctx: &mut OpContext<'_>) -> Result<Flow> {
        for index in 0..ctx.input_count() {
            let input = ctx
                .input(index)
                .unwrap_or_else(|| panic!("relay input {index} is missing"));

            let output = ctx
                .output(index)
                .unwrap_or_else(|| panic!("relay output {index} was not bound to its input"));

            assert!(
                Value::ptr_eq(input, output),
                "relay input and output {index} are not sharing the same buffer"
            );
        }

        Ok(Flow::Continue)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{Graph, RunContext};

    #[test]
    fn outputs_alias_inputs_for_any_width() {
        for width in 1..=8_u32 {
            let mut builder = Graph::builder();
            let inputs = (0..width).map(|_| builder.input()).collect::<Vec<_>>();
            let outputs = builder.node(Relay::new(), &inputs, inputs.len());
            for slot in outputs {
                builder.output(slot);
            }
            let graph = builder.build().unwrap();

            let values = (0..width).map(Value::new).collect::<Vec<_>>();
            let outputs = graph
                .run(&RunContext::new(), values.clone())
                .unwrap()
                .into_outputs()
                .unwrap();

            assert_eq!(outputs.len(), values.len());
            for (output, input) in outputs.iter().zip(&values) {
                assert!(Value::ptr_eq(output, input));
            }
        }
    }

    #[test]
    fn outputs_alias_inputs_of_mixed_types() {
        let mut builder = Graph::builder();
        let inputs = [builder.input(), builder.input(), builder.input()];
        let outputs = builder.node(Relay::new(), &inputs, 3);
        for slot in outputs {
            builder.output(slot);
        }
        let graph = builder.build().unwrap();

        let values = vec![Value::new(1_u32), Value::new([0.5_f32; 8]), Value::new("x")];
        let outputs = graph
            .run(&RunContext::new(), values.clone())
            .unwrap()
            .into_outputs()
            .unwrap();

        for (output, input) in outputs.iter().zip(&values) {
            assert!(Value::ptr_eq(output, input));
        }
    }

    #[test]
    #[should_panic]
    fn copied_output_panics() {
        let run = RunContext::new();
        let inputs = [Value::new(1_u32)];
        let mut ctx = OpContext::new("relay", &inputs, vec![Some(Value::new(1_u32))], &run);

        _ = Relay::new().compute(&mut ctx);
    }

    #[test]
    #[should_panic]
    fn unbound_output_panics() {
        let run = RunContext::new();
        let inputs = [Value::new(1_u32)];
        let mut ctx = OpContext::new("relay", &inputs, vec![None], &run);

        _ = Relay::new().compute(&mut ctx);
    }

    #[test]
    fn rejects_mismatched_arity() {
        let mut builder = Graph::builder();
        let a = builder.input();
        builder.node(Relay::new(), &[a], 2);

        assert!(matches!(builder.build(), Err(Error::InvalidGraph { .. })));
    }

    #[test]
    fn rejects_zero_inputs() {
        let mut builder = Graph::builder();
        builder.node(Relay::new(), &[], 0);

        assert!(matches!(builder.build(), Err(Error::InvalidGraph { .. })));
    }
}
