use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel, Connection};

use crate::{declare_queue, BrokerError, REQUEST_QUEUE};

/// Publishes stock-quote commands onto the request queue. The queue is
/// declared once at construction; the channel is reused for every publish.
pub struct StockPublisher {
    channel: Channel,
}

impl StockPublisher {
    pub async fn new(conn: &Connection) -> Result<Self, BrokerError> {
        let channel = conn.create_channel().await.map_err(BrokerError::Channel)?;
        declare_queue(&channel, REQUEST_QUEUE).await?;
        Ok(Self { channel })
    }

    /// Publish the bare ticker code. No retry, no local queuing; the caller
    /// logs and drops on error.
    pub async fn publish(&self, stock_code: &str) -> Result<(), BrokerError> {
        self.channel
            .basic_publish(
                "",
                REQUEST_QUEUE,
                BasicPublishOptions::default(),
                stock_code.as_bytes(),
                BasicProperties::default().with_content_type("text/plain".into()),
            )
            .await
            .map_err(|source| BrokerError::Publish {
                queue: REQUEST_QUEUE,
                source,
            })?
            .await
            .map_err(|source| BrokerError::Publish {
                queue: REQUEST_QUEUE,
                source,
            })?;

        tracing::info!(stock_code, "stock command published");
        Ok(())
    }
}
