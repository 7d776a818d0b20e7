#[tokio::main]
async fn main() -> anyhow::Result<()> {
    streamcatch_lib::run().await
}
