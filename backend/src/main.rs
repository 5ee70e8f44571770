#[tokio::main]
async fn main() -> anyhow::Result<()> {
    connector::start_server().await
}
