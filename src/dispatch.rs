//! Per-delivery dispatch.
//!
//! For each delivery on an operator queue the dispatcher decodes the body,
//! invokes the operator, publishes one PROCESSING envelope per produced
//! element followed by a DONE envelope, and acknowledges. Any failure along
//! the way is converted into a single ERROR envelope instead; only broker
//! failures surface to the consume loop, leaving the delivery
//! unacknowledged.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerError, Delivery, PublishProperties};
use crate::envelope::Envelope;
use crate::operator::{Descriptor, OperatorError};

/// Queue receiving error envelopes when the caller gave no reply queue.
pub const DEAD_LETTERS_QUEUE: &str = "__dead_letters_queue__";

/// Separator for path-style `reply_to` values.
const REPLY_PATH_SEPARATOR: char = '>';

// ---------------------------------------------------------------------------
// Per-delivery failures
// ---------------------------------------------------------------------------

/// A per-delivery failure; its display form becomes the envelope `error`.
///
/// The three precondition messages are fixed wire contract: callers match on
/// them.
#[derive(Debug, Error)]
enum DispatchError {
    #[error("No property reply_to")]
    MissingReplyTo,

    #[error("No delivery tag")]
    MissingDeliveryTag,

    #[error("No correlation_id")]
    MissingCorrelationId,

    #[error("invalid request body: {0}")]
    Decode(serde_json::Error),

    #[error(transparent)]
    Operator(#[from] OperatorError),

    #[error("failed to encode reply: {0}")]
    Encode(serde_json::Error),
}

enum Outcome {
    Completed,
    Failed(DispatchError),
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Dispatch one delivery for `descriptor`.
///
/// # Errors
///
/// Returns [`BrokerError`] only when publishing or acknowledging fails;
/// every other failure is reported to the caller as an ERROR envelope.
pub async fn dispatch(
    broker: &dyn Broker,
    descriptor: &Descriptor,
    delivery: Delivery,
) -> Result<(), BrokerError> {
    debug!(
        operator = descriptor.name(),
        bytes = delivery.body.len(),
        "dispatching delivery"
    );

    match run_delivery(broker, descriptor, &delivery).await? {
        Outcome::Completed => Ok(()),
        Outcome::Failed(error) => fail_delivery(broker, descriptor, &delivery, &error).await,
    }
}

/// Drive the happy path, collecting any per-delivery failure as an outcome.
async fn run_delivery(
    broker: &dyn Broker,
    descriptor: &Descriptor,
    delivery: &Delivery,
) -> Result<Outcome, BrokerError> {
    let Some(reply_to) = delivery.reply_to.as_deref() else {
        return Ok(Outcome::Failed(DispatchError::MissingReplyTo));
    };
    let Some(delivery_tag) = delivery.delivery_tag else {
        return Ok(Outcome::Failed(DispatchError::MissingDeliveryTag));
    };
    let Some(correlation_id) = delivery.correlation_id.as_deref() else {
        return Ok(Outcome::Failed(DispatchError::MissingCorrelationId));
    };

    let request: Value = match serde_json::from_slice(&delivery.body) {
        Ok(request) => request,
        Err(error) => return Ok(Outcome::Failed(DispatchError::Decode(error))),
    };

    let elements = match descriptor.call(request.clone()) {
        Ok(elements) => elements,
        Err(error) => return Ok(Outcome::Failed(error.into())),
    };

    // Publish each element before pulling the next one from the operator.
    let mut num: u64 = 0;
    for element in elements {
        let element = match element {
            Ok(element) => element,
            Err(error) => return Ok(Outcome::Failed(error.into())),
        };
        let envelope = Envelope::processing(request.clone(), element, num);
        let body = match envelope.to_bytes() {
            Ok(body) => body,
            Err(error) => return Ok(Outcome::Failed(DispatchError::Encode(error))),
        };
        send(broker, reply_to, Some(correlation_id), body).await?;
        num += 1;
    }

    let done = Envelope::done(request, num);
    let body = match done.to_bytes() {
        Ok(body) => body,
        Err(error) => return Ok(Outcome::Failed(DispatchError::Encode(error))),
    };
    send(broker, reply_to, Some(correlation_id), body).await?;

    broker.basic_ack(delivery_tag).await?;
    info!(
        operator = descriptor.name(),
        elements = num,
        "delivery completed"
    );
    Ok(Outcome::Completed)
}

/// Publish a single ERROR envelope and acknowledge when possible.
///
/// Without a `reply_to` the envelope goes to the dead-letter queue, which is
/// declared on first use.
async fn fail_delivery(
    broker: &dyn Broker,
    descriptor: &Descriptor,
    delivery: &Delivery,
    error: &DispatchError,
) -> Result<(), BrokerError> {
    warn!(
        operator = descriptor.name(),
        error = %error,
        "delivery failed"
    );

    let request = best_effort_request(&delivery.body);
    let envelope = Envelope::error(request, error.to_string());
    let correlation_id = delivery.correlation_id.as_deref();

    match envelope.to_bytes() {
        Ok(body) => match delivery.reply_to.as_deref() {
            Some(reply_to) => send(broker, reply_to, correlation_id, body).await?,
            None => {
                broker.queue_declare(DEAD_LETTERS_QUEUE).await?;
                broker
                    .basic_publish(
                        DEAD_LETTERS_QUEUE,
                        body,
                        PublishProperties {
                            correlation_id: correlation_id.map(str::to_owned),
                            reply_to: None,
                        },
                    )
                    .await?;
            }
        },
        Err(error) => warn!(error = %error, "failed to encode error envelope"),
    }

    if let Some(delivery_tag) = delivery.delivery_tag {
        broker.basic_ack(delivery_tag).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reply routing
// ---------------------------------------------------------------------------

/// Split a path-style `reply_to` into the immediate target and the tail.
fn split_reply_path(reply_to: &str) -> (&str, Option<&str>) {
    match reply_to.split_once(REPLY_PATH_SEPARATOR) {
        Some((head, tail)) => (head, Some(tail)),
        None => (reply_to, None),
    }
}

/// Publish `body` towards `reply_to`, forwarding any remaining reply path.
async fn send(
    broker: &dyn Broker,
    reply_to: &str,
    correlation_id: Option<&str>,
    body: Vec<u8>,
) -> Result<(), BrokerError> {
    let (routing_key, forward) = split_reply_path(reply_to);
    broker
        .basic_publish(
            routing_key,
            body,
            PublishProperties {
                correlation_id: correlation_id.map(str::to_owned),
                reply_to: forward.map(str::to_owned),
            },
        )
        .await
}

/// Decode the body if it is valid JSON, else fall back to its text form.
fn best_effort_request(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
