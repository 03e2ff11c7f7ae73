#[tokio::main]
async fn main() -> anyhow::Result<()> {
    frontend_telemetry::run_server().await
}
