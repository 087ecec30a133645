#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tharnax::bootstrapper::run().await
}
