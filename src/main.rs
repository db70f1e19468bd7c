mod app;
mod commands;
mod logging;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    app::run().await
}
