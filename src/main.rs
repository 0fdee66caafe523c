use std::sync::Arc;

use stockchat_broker::{ResponseSubscriber, StockPublisher};
use stockchat_core::BrokerConfig;
use stockchat_server::{bridge, server, HubHandle};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting stockchat server");

    let config = BrokerConfig::from_env().expect("Failed to read broker configuration");
    let conn = stockchat_broker::connect(&config)
        .await
        .expect("Failed to connect to broker");

    let (hub, _hub_task) = HubHandle::spawn();

    let publisher = StockPublisher::new(&conn)
        .await
        .expect("Failed to set up stock publisher");

    // Quote responses feed straight back into the broadcast path. Not being
    // able to subscribe at startup is fatal.
    let subscriber = ResponseSubscriber::subscribe(&conn)
        .await
        .expect("Failed to subscribe to stock responses");
    let _bridge = bridge::start(subscriber, hub.clone());

    let server_config = server::ServerConfig::default();
    let port = server_config.port;
    let _handle = server::start(server_config, hub, Arc::new(publisher))
        .await
        .expect("Failed to start server");

    tracing::info!(port = port, "stockchat server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}
