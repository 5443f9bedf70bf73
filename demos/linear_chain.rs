//! Linear chain example
//!
//! Three nodes wired A -> B -> C, each one forwarding its output into the
//! next under a named parameter. Demonstrates the simplest possible
//! dependency chain and the order after-run events fire in.

use dagflow::{Executor, ForwardAs, NodeBuilder};

#[tokio::main]
async fn main() {
    println!("=== Linear Chain Example ===\n");

    let a = NodeBuilder::single("A", |_args| Box::pin(async move { Ok::<_, dagflow::BoxError>("x".to_string()) })).build();

    let b = NodeBuilder::single("B", |args| {
        Box::pin(async move {
            let d: String = args.get("d").cloned().unwrap_or_default();
            Ok::<_, dagflow::BoxError>(format!("p_{d}"))
        })
    })
    .param("d")
    .build();

    let c = NodeBuilder::single("C", |args| {
        Box::pin(async move {
            let d: String = args.get("d").cloned().unwrap_or_default();
            Ok::<_, dagflow::BoxError>(format!("q_{d}"))
        })
    })
    .param("d")
    .build();

    a.connect(&b, ForwardAs::Named("d".to_string()), None).await.unwrap();
    b.connect(&c, ForwardAs::Named("d".to_string()), None).await.unwrap();

    let executor = Executor::new("linear-chain", vec![a]);
    let (completed, _chunks) = executor.run().await;

    for node in &completed {
        println!("{} -> {:?} (level {})", node.id, node.output().await, node.metadata().await.level);
    }

    let c_output = completed.iter().find(|n| n.id == "C").unwrap().output().await;
    assert_eq!(c_output.as_deref(), Some("q_p_x"));
    println!("\nC.output == \"q_p_x\" as expected");
}
