use futures::StreamExt;
use lapin::options::BasicConsumeOptions;
use lapin::types::FieldTable;
use lapin::{Connection, Consumer};

use crate::{declare_queue, BrokerError, RESPONSE_QUEUE};

/// Auto-acknowledging consumer of the response queue. Deliveries are
/// considered handled the moment the broker hands them over; a crash before
/// forwarding loses the in-flight message.
pub struct ResponseSubscriber {
    consumer: Consumer,
}

impl ResponseSubscriber {
    /// Declare the response queue and start consuming. A failure here is
    /// fatal to the quote feature and is surfaced to the caller.
    pub async fn subscribe(conn: &Connection) -> Result<Self, BrokerError> {
        let channel = conn.create_channel().await.map_err(BrokerError::Channel)?;
        declare_queue(&channel, RESPONSE_QUEUE).await?;

        let consumer = channel
            .basic_consume(
                RESPONSE_QUEUE,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| BrokerError::Subscribe {
                queue: RESPONSE_QUEUE,
                source,
            })?;

        Ok(Self { consumer })
    }

    /// Next response payload, or `None` once the consumer stream ends.
    /// Individual delivery errors are logged and skipped.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            match self.consumer.next().await? {
                Ok(delivery) => {
                    return Some(String::from_utf8_lossy(&delivery.data).into_owned());
                }
                Err(error) => {
                    tracing::warn!(error = %error, "response delivery error, skipping");
                }
            }
        }
    }
}
