//! Streaming generator example
//!
//! A single root node streams five values; `yielding` interleaves the
//! resulting chunks with the node's completion event.

use dagflow::{Event, Executor, NodeBuilder};
use futures::StreamExt;

#[tokio::main]
async fn main() {
    println!("=== Streaming Generator Example ===\n");

    let n = NodeBuilder::streaming("N", |_args| {
        Box::pin(futures::stream::iter((0..5).map(|i| Ok::<_, dagflow::BoxError>(i))))
    })
    .build();

    let executor = Executor::new("streaming-generator", vec![n]);
    let stream = executor.yielding(std::time::Duration::from_millis(50));
    tokio::pin!(stream);

    let mut chunk_count = 0;
    while let Some(event) = stream.next().await {
        match event {
            Event::Chunk(c) => {
                println!("chunk from {}: {:?}", c.source_id, c.value);
                chunk_count += 1;
            }
            Event::Completed(node) => println!("completed {}", node.id),
        }
    }

    assert_eq!(chunk_count, 5);
    println!("\nobserved 5 chunks as expected");
}
