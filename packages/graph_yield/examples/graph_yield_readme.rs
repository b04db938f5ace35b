//! Splits a tiny training graph at a suspension point and performs the "optimizer step" on the
//! main thread between the forward and the backward half.

use std::sync::Arc;

use graph_yield::{FnOperator, Graph, Session, SuspensionPoint, Value};

fn number(value: &Value) -> f64 {
    value.downcast_ref::<f64>().copied().unwrap_or_default()
}

fn main() {
    // weight, x -> [forward] -> prediction -> (suspend) -> gradient -> [backward] -> update
    let mut builder = Graph::builder();
    let weight = builder.input();
    let x = builder.input();
    let prediction = builder.node(
        FnOperator::new("forward", |inputs| {
            vec![Value::new(number(&inputs[0]) * number(&inputs[1]))]
        }),
        &[weight, x],
        1,
    );
    let gradient = builder.node(SuspensionPoint::new(), &[prediction[0], weight], 1);
    let update = builder.node(
        FnOperator::new("backward", |inputs| {
            vec![Value::new(number(&inputs[0]) * 0.1)]
        }),
        &[gradient[0]],
        1,
    );
    builder.output(update[0]);
    let graph = Arc::new(builder.build().expect("graph is well formed"));

    let target = 6.0;
    let mut weight = 1.0_f64;
    let mut session = Session::new();

    for step in 0..5 {
        let outcome = session
            .run_step(
                Arc::clone(&graph),
                vec![Value::new(weight), Value::new(2.0_f64)],
                |yielded| {
                    let prediction = number(&yielded[0]);
                    println!("step {step}: prediction {prediction:.3}");

                    Some(vec![Value::new(prediction - target)])
                },
            )
            .expect("step runs to completion");

        let outputs = outcome.into_outputs().expect("step was not terminated");
        weight -= number(&outputs[0]);
    }

    println!("final weight: {weight:.3}");
}
