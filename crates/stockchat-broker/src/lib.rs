pub mod publish;
pub mod subscribe;

use lapin::options::QueueDeclareOptions;
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use stockchat_core::BrokerConfig;

pub use publish::StockPublisher;
pub use subscribe::ResponseSubscriber;

/// Durable queue carrying bare ticker codes from the chat server.
pub const REQUEST_QUEUE: &str = "mq_stock_code_req";
/// Durable queue carrying formatted quote sentences back to the chat server.
pub const RESPONSE_QUEUE: &str = "mq_stock_code_res";

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connect(#[source] lapin::Error),
    #[error("broker channel unavailable: {0}")]
    Channel(#[source] lapin::Error),
    #[error("declaring queue {queue} failed: {source}")]
    QueueDeclare {
        queue: &'static str,
        #[source]
        source: lapin::Error,
    },
    #[error("publish to {queue} failed: {source}")]
    Publish {
        queue: &'static str,
        #[source]
        source: lapin::Error,
    },
    #[error("subscribe to {queue} failed: {source}")]
    Subscribe {
        queue: &'static str,
        #[source]
        source: lapin::Error,
    },
}

/// Open a connection to the broker described by `config`.
pub async fn connect(config: &BrokerConfig) -> Result<Connection, BrokerError> {
    Connection::connect(&config.amqp_url(), ConnectionProperties::default())
        .await
        .map_err(BrokerError::Connect)
}

/// Idempotently ensure a durable queue exists on `channel`.
pub async fn declare_queue(
    channel: &Channel,
    queue: &'static str,
) -> Result<(), BrokerError> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map(|_| ())
        .map_err(|source| BrokerError::QueueDeclare { queue, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_match_wire_contract() {
        assert_eq!(REQUEST_QUEUE, "mq_stock_code_req");
        assert_eq!(RESPONSE_QUEUE, "mq_stock_code_res");
    }
}
