//! Shared test doubles and fixtures.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use straylight::broker::{Broker, BrokerError, Delivery, PublishProperties};
use straylight::envelope::Envelope;
use straylight::operator::{Descriptor, ErasedEmission, RunError};
use straylight::ops::{Pair, Sequence, Sum, Total};
use straylight::schema::SchemaAdapter;

/// Delivery tag used by [`delivery`].
pub const TAG: u64 = 7;

// ---------------------------------------------------------------------------
// MockBroker
// ---------------------------------------------------------------------------

/// One message captured by [`MockBroker`].
#[derive(Debug, Clone)]
pub struct Published {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub properties: PublishProperties,
}

/// Recording broker double.
#[derive(Debug, Default)]
pub struct MockBroker {
    declared: Mutex<Vec<String>>,
    published: Mutex<Vec<Published>>,
    acked: Mutex<Vec<u64>>,
}

#[async_trait]
impl Broker for MockBroker {
    async fn queue_declare(&self, queue: &str) -> Result<(), BrokerError> {
        self.declared.lock().expect("lock").push(queue.to_owned());
        Ok(())
    }

    async fn basic_publish(
        &self,
        routing_key: &str,
        body: Vec<u8>,
        properties: PublishProperties,
    ) -> Result<(), BrokerError> {
        self.published.lock().expect("lock").push(Published {
            routing_key: routing_key.to_owned(),
            body,
            properties,
        });
        Ok(())
    }

    async fn basic_ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.acked.lock().expect("lock").push(delivery_tag);
        Ok(())
    }
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every published message, decoded as an envelope.
    pub fn envelopes(&self) -> Vec<(String, Envelope, PublishProperties)> {
        self.published
            .lock()
            .expect("lock")
            .iter()
            .map(|message| {
                (
                    message.routing_key.clone(),
                    serde_json::from_slice(&message.body).expect("envelope json"),
                    message.properties.clone(),
                )
            })
            .collect()
    }

    /// Every published message, raw.
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().expect("lock").clone()
    }

    pub fn acks(&self) -> Vec<u64> {
        self.acked.lock().expect("lock").clone()
    }

    pub fn declared_queues(&self) -> Vec<String> {
        self.declared.lock().expect("lock").clone()
    }
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

/// A delivery with every property present.
pub fn delivery(body: &str, reply_to: &str, correlation_id: &str) -> Delivery {
    Delivery {
        delivery_tag: Some(TAG),
        reply_to: Some(reply_to.to_owned()),
        correlation_id: Some(correlation_id.to_owned()),
        body: body.as_bytes().to_vec(),
    }
}

// ---------------------------------------------------------------------------
// Descriptors under test
// ---------------------------------------------------------------------------

pub fn sum() -> Descriptor {
    Descriptor::new("Sum", Sum)
}

pub fn sequence() -> Descriptor {
    Descriptor::new("Sequence", Sequence)
}

/// Streams `yields` valid elements, then fails.
pub fn flaky(yields: i64) -> Descriptor {
    Descriptor::builder("Flaky")
        .input(SchemaAdapter::of::<Pair>())
        .output(SchemaAdapter::of::<Total>())
        .run(move |_input| {
            let elements: ErasedEmission = Box::new(
                (0..yields)
                    .map(|c| Ok(json!({"c": c})))
                    .chain(std::iter::once(Err(RunError::new("boom")))),
            );
            Ok(elements)
        })
        .build()
}

/// Streams `yields` valid elements, then one that violates the output
/// schema.
pub fn leaky(yields: i64) -> Descriptor {
    Descriptor::builder("Leaky")
        .input(SchemaAdapter::of::<Pair>())
        .output(SchemaAdapter::of::<Total>())
        .run(move |_input| {
            let elements: ErasedEmission = Box::new(
                (0..yields)
                    .map(|c| Ok(json!({"c": c})))
                    .chain(std::iter::once(Ok(json!({"c": "not a number"})))),
            );
            Ok(elements)
        })
        .build()
}
