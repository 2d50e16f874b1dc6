use anyhow::Context;
use blockscout_service_launcher::launcher::ConfigSettings;
use token_relay_server::{Settings, run};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let settings = Settings::build().context("failed to read config")?;
    run(settings).await
}
