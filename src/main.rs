// Warrant Radar service entry point

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warrant_radar::run().await
}
