//! AUTO forwarding example
//!
//! A parent forwards its output into the child's unique eligible parameter
//! without naming it. Also shows the rejection when the child instead has
//! two free parameters and AUTO cannot disambiguate.

use dagflow::{Executor, NodeBuilder, AUTO};

#[tokio::main]
async fn main() {
    println!("=== AUTO Forwarding Example ===\n");

    let p = NodeBuilder::single("P", |_args| Box::pin(async move { Ok::<_, dagflow::BoxError>("v".to_string()) })).build();

    let single_param_child = NodeBuilder::single("C", |args| {
        Box::pin(async move {
            let x: String = args.get("x").cloned().unwrap_or_default();
            Ok::<_, dagflow::BoxError>(x)
        })
    })
    .param("x")
    .build();

    p.connect(&single_param_child, AUTO, None).await.unwrap();

    let executor = Executor::new("auto-forward-ok", vec![p]);
    let (completed, _) = executor.run().await;
    let c_output = completed.iter().find(|n| n.id == "C").unwrap().output().await;
    assert_eq!(c_output.as_deref(), Some("v"));
    println!("single-parameter child: AUTO resolved to \"x\", C.output == \"v\"");

    let p2 = NodeBuilder::single("P2", |_args| Box::pin(async move { Ok::<_, dagflow::BoxError>("v".to_string()) })).build();
    let two_param_child = NodeBuilder::single("C2", |_args| Box::pin(async move { Ok::<_, dagflow::BoxError>(String::new()) }))
        .params(["x", "y"])
        .build();

    let err = p2.connect(&two_param_child, AUTO, None).await.unwrap_err();
    println!("two-parameter child: AUTO rejected with {err}");
}
