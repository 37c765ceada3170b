use std::sync::Arc;

use wingsync_mock::run;
use wingsync_mock::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Arc::new(Settings::new().map_err(|e| anyhow::anyhow!("Failed to load settings: {e}"))?);

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let app_name = env!("CARGO_PKG_NAME").replace('-', "_");
            let level = settings.logger.level.as_str();

            format!("{app_name}={level},wingsync_embedded={level}").into()
        }))
        .init();

    run(&settings).await
}
