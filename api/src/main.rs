mod server;
mod store;
mod sunset;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    server::run().await
}
