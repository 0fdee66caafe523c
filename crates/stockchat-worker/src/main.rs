use stockchat_core::BrokerConfig;
use stockchat_worker::quote::QuoteClient;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting stockchat quote worker");

    let config = BrokerConfig::from_env().expect("Failed to read broker configuration");
    let conn = stockchat_broker::connect(&config)
        .await
        .expect("Failed to connect to broker");

    tokio::select! {
        result = stockchat_worker::run(&conn, QuoteClient::new()) => {
            result.expect("Consume loop failed");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
}
