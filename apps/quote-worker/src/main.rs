//! Quote Worker - Entry Point
//!
//! Background worker that processes quotes from the priority queue.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    quote_worker::run().await
}
