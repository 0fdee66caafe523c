pub mod quote;

use futures::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicPublishOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection};
use stockchat_broker::{declare_queue, BrokerError, REQUEST_QUEUE, RESPONSE_QUEUE};

use crate::quote::QuoteClient;

pub use quote::{format_quote, parse_close_price, QuoteError};

/// Consume ticker requests, resolve each one against the quote source, and
/// publish the formatted sentence on the response queue. Requests are
/// auto-acknowledged on delivery; any lookup or publish failure is logged
/// and the request dropped, with no retry and no dead-letter queue.
pub async fn run(conn: &Connection, quotes: QuoteClient) -> Result<(), BrokerError> {
    let channel = conn.create_channel().await.map_err(BrokerError::Channel)?;
    declare_queue(&channel, REQUEST_QUEUE).await?;
    declare_queue(&channel, RESPONSE_QUEUE).await?;

    let mut consumer = channel
        .basic_consume(
            REQUEST_QUEUE,
            "",
            BasicConsumeOptions {
                no_ack: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|source| BrokerError::Subscribe {
            queue: REQUEST_QUEUE,
            source,
        })?;

    tracing::info!(queue = REQUEST_QUEUE, "waiting for stock commands");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(error) => {
                tracing::warn!(error = %error, "request delivery error, skipping");
                continue;
            }
        };

        let stock_code = String::from_utf8_lossy(&delivery.data).into_owned();
        tracing::info!(stock_code = %stock_code, "stock command received");

        let response = match quotes.fetch(&stock_code).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    stock_code = %stock_code,
                    error = %error,
                    "quote lookup failed, dropping request"
                );
                continue;
            }
        };

        let published = channel
            .basic_publish(
                "",
                RESPONSE_QUEUE,
                BasicPublishOptions::default(),
                response.as_bytes(),
                BasicProperties::default().with_content_type("text/plain".into()),
            )
            .await;

        let confirm = match published {
            Ok(confirm) => confirm,
            Err(error) => {
                tracing::warn!(error = %error, "publishing stock response failed");
                continue;
            }
        };
        if let Err(error) = confirm.await {
            tracing::warn!(error = %error, "publishing stock response failed");
            continue;
        }

        tracing::info!(response = %response, "stock response published");
    }

    Ok(())
}
