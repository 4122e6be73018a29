//! Introspection endpoint.
//!
//! The reserved `__info__` queue answers with the schemas of every
//! registered operator, so callers can discover what the worker exposes
//! without out-of-band documentation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::broker::{Broker, BrokerError, Delivery, PublishProperties};
use crate::registry::Registry;

/// Queue carrying introspection requests.
pub const INFO_QUEUE: &str = "__info__";

/// Schema advertisement for one registered operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorInfo {
    /// Operator (and queue) name.
    pub name: String,
    /// JSON Schema of the input contract.
    pub input: Value,
    /// JSON Schema of the output contract.
    pub output: Value,
}

/// Build the advertisement list, preserving registration order.
pub fn operator_info(registry: &Registry) -> Vec<OperatorInfo> {
    registry
        .iter()
        .map(|(name, descriptor)| OperatorInfo {
            name: name.to_owned(),
            input: descriptor.input_schema().cloned().unwrap_or(Value::Null),
            output: descriptor.output_schema().cloned().unwrap_or(Value::Null),
        })
        .collect()
}

/// Answer one delivery on the info queue.
///
/// Deliveries without a reply queue are acknowledged and otherwise ignored;
/// introspection requests are never dead-lettered. The reply carries the
/// caller's correlation id when present and never forwards a `reply_to`.
///
/// # Errors
///
/// Returns [`BrokerError`] when publishing or acknowledging fails.
pub async fn handle_info(
    broker: &dyn Broker,
    registry: &Registry,
    delivery: Delivery,
) -> Result<(), BrokerError> {
    match delivery.reply_to.as_deref() {
        Some(reply_to) => {
            let info = operator_info(registry);
            match serde_json::to_vec(&info) {
                Ok(body) => {
                    broker
                        .basic_publish(
                            reply_to,
                            body,
                            PublishProperties {
                                correlation_id: delivery.correlation_id.clone(),
                                reply_to: None,
                            },
                        )
                        .await?;
                }
                Err(error) => warn!(error = %error, "failed to encode operator info"),
            }
        }
        None => debug!("info request without reply_to, ignoring"),
    }

    if let Some(delivery_tag) = delivery.delivery_tag {
        broker.basic_ack(delivery_tag).await?;
    }
    Ok(())
}
