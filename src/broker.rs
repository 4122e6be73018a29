//! Broker channel abstraction.
//!
//! Handlers talk to the broker through [`Broker`], which covers the small
//! AMQP subset the worker uses: declare a queue, publish on the default
//! exchange, acknowledge a delivery. The live implementation is a lapin
//! channel; tests substitute a recording double. The channel is owned by the
//! server loop and lent to a handler for the duration of one delivery.

use async_trait::async_trait;
use lapin::options::{BasicAckOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::{FieldTable, ShortString};
use lapin::BasicProperties;
use thiserror::Error;

/// Broker-level failure.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The underlying AMQP client failed.
    #[error(transparent)]
    Amqp(#[from] lapin::Error),

    /// Failure from a non-AMQP channel implementation.
    #[error("{0}")]
    Other(String),
}

/// Properties attached to an outgoing reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishProperties {
    /// Correlation id echoed from the incoming message.
    pub correlation_id: Option<String>,
    /// Remaining reply path forwarded to the next hop.
    pub reply_to: Option<String>,
}

/// One incoming message as seen by a handler.
///
/// Consumed exactly once per delivery; handlers never retain it.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broker delivery tag used for the acknowledgement.
    pub delivery_tag: Option<u64>,
    /// Queue the caller wants replies on.
    pub reply_to: Option<String>,
    /// Caller-supplied correlation id.
    pub correlation_id: Option<String>,
    /// Raw message body.
    pub body: Vec<u8>,
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        Self {
            delivery_tag: Some(delivery.delivery_tag),
            reply_to: delivery
                .properties
                .reply_to()
                .as_ref()
                .map(|value| value.as_str().to_owned()),
            correlation_id: delivery
                .properties
                .correlation_id()
                .as_ref()
                .map(|value| value.as_str().to_owned()),
            body: delivery.data,
        }
    }
}

/// The AMQP subset used by the worker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Idempotently declare `queue`.
    async fn queue_declare(&self, queue: &str) -> Result<(), BrokerError>;

    /// Publish `body` to `routing_key` on the default exchange.
    async fn basic_publish(
        &self,
        routing_key: &str,
        body: Vec<u8>,
        properties: PublishProperties,
    ) -> Result<(), BrokerError>;

    /// Positively acknowledge the delivery carrying `delivery_tag`.
    async fn basic_ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;
}

#[async_trait]
impl Broker for lapin::Channel {
    async fn queue_declare(&self, queue: &str) -> Result<(), BrokerError> {
        lapin::Channel::queue_declare(
            self,
            queue,
            QueueDeclareOptions::default(),
            FieldTable::default(),
        )
        .await?;
        Ok(())
    }

    async fn basic_publish(
        &self,
        routing_key: &str,
        body: Vec<u8>,
        properties: PublishProperties,
    ) -> Result<(), BrokerError> {
        let mut props = BasicProperties::default();
        if let Some(correlation_id) = properties.correlation_id {
            props = props.with_correlation_id(ShortString::from(correlation_id));
        }
        if let Some(reply_to) = properties.reply_to {
            props = props.with_reply_to(ShortString::from(reply_to));
        }

        lapin::Channel::basic_publish(
            self,
            "",
            routing_key,
            BasicPublishOptions::default(),
            &body,
            props,
        )
        .await?
        .await?;
        Ok(())
    }

    async fn basic_ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        lapin::Channel::basic_ack(self, delivery_tag, BasicAckOptions::default()).await?;
        Ok(())
    }
}
