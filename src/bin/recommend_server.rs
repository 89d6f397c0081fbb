use anyhow::Result;

use travel_recommender::utils::init_telemetry;
use travel_recommender::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    let _telemetry = init_telemetry("travel_recommender_server")?;
    travel_recommender::server::run_server(config).await
}
