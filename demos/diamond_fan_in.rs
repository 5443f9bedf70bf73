//! Diamond fan-in example
//!
//! A -> {B, C} -> D. B and C both depend only on A and may run concurrently;
//! D depends on both and only becomes ready once each has forwarded its
//! value in.

use dagflow::{Executor, ForwardAs, NodeBuilder};

#[tokio::main]
async fn main() {
    println!("=== Diamond Fan-in Example ===\n");

    let a = NodeBuilder::single("A", |_args| Box::pin(async move { Ok::<_, dagflow::BoxError>(1i64) })).build();

    let b = NodeBuilder::single("B", |args| {
        Box::pin(async move {
            let a: i64 = *args.get("a").unwrap();
            Ok::<_, dagflow::BoxError>(a + 10)
        })
    })
    .param("a")
    .build();

    let c = NodeBuilder::single("C", |args| {
        Box::pin(async move {
            let a: i64 = *args.get("a").unwrap();
            Ok::<_, dagflow::BoxError>(a + 20)
        })
    })
    .param("a")
    .build();

    let d = NodeBuilder::single("D", |args| {
        Box::pin(async move {
            let b: i64 = *args.get("b").unwrap();
            let c: i64 = *args.get("c").unwrap();
            Ok::<_, dagflow::BoxError>(b + c)
        })
    })
    .params(["b", "c"])
    .build();

    a.connect(&b, ForwardAs::Named("a".to_string()), None).await.unwrap();
    a.connect(&c, ForwardAs::Named("a".to_string()), None).await.unwrap();
    b.connect(&d, ForwardAs::Named("b".to_string()), None).await.unwrap();
    c.connect(&d, ForwardAs::Named("c".to_string()), None).await.unwrap();

    let executor = Executor::new("diamond-fan-in", vec![a]);
    let (completed, _chunks) = executor.run().await;

    for node in &completed {
        println!("{} -> {:?}", node.id, node.output().await);
    }

    let d_output = completed.iter().find(|n| n.id == "D").unwrap().output().await;
    assert_eq!(d_output, Some(32));
    println!("\nD.output == 32 as expected");
}
