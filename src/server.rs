//! Server loop.
//!
//! Startup resolves the operator list, builds the registry, connects to the
//! broker, declares one queue per operator plus the reserved `__info__`
//! queue, and consumes all of them on a single channel. Deliveries are
//! handled strictly one at a time; the channel is lent to a handler for the
//! duration of one delivery and never retained.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use lapin::options::{BasicConsumeOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{AMQPScheme, AMQPUri};
use lapin::{Connection, ConnectionProperties};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::broker::Delivery;
use crate::config::{read_operator_list, ConfigError, Settings};
use crate::dispatch;
use crate::introspect::{self, INFO_QUEUE};
use crate::operator::Descriptor;
use crate::registry::{Catalog, Registry, RegistryError};

/// Reply code sent when closing the channel and connection.
const CLOSE_OK: u16 = 200;

/// Fatal startup failure of the worker.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An operator identifier failed to resolve.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The broker connection or channel failed.
    #[error(transparent)]
    Amqp(#[from] lapin::Error),
}

/// What a consumed queue is bound to.
enum Binding {
    Info,
    Operator(Arc<Descriptor>),
}

/// Run the worker until shutdown.
///
/// Registers the configured operators against `catalog`, connects to the
/// broker, and consumes indefinitely. The channel and connection are closed
/// on both normal and error exit.
///
/// # Errors
///
/// Returns [`ServeError`] on configuration, registration, or broker
/// failure.
pub async fn serve(settings: &Settings, catalog: &Catalog) -> Result<(), ServeError> {
    let qualified = read_operator_list(&settings.config_filename)?;
    let registry = Registry::build(catalog, &qualified)?;
    info!(operators = registry.len(), "registry built");

    let connection = Connection::connect_uri(
        amqp_uri(settings),
        ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio),
    )
    .await?;
    info!(host = %settings.host, port = settings.port, "connected to broker");
    let channel = connection.create_channel().await?;

    let result = consume(&channel, &registry).await;

    // Channel first, then connection, also when the loop failed.
    if let Err(close_error) = channel.close(CLOSE_OK, "shutting down").await {
        warn!(error = %close_error, "failed to close channel");
    }
    if let Err(close_error) = connection.close(CLOSE_OK, "shutting down").await {
        warn!(error = %close_error, "failed to close connection");
    }

    result
}

/// Declare and consume every queue, handling deliveries sequentially.
async fn consume(channel: &lapin::Channel, registry: &Registry) -> Result<(), ServeError> {
    let mut bindings: Vec<Binding> = Vec::new();
    let mut consumers = Vec::new();

    // The info queue first, then one queue per operator in registration
    // order. The queue name is the operator's short name.
    bindings.push(Binding::Info);
    consumers.push(consume_queue(channel, INFO_QUEUE).await?);
    for (name, descriptor) in registry.iter() {
        bindings.push(Binding::Operator(Arc::clone(descriptor)));
        consumers.push(consume_queue(channel, name).await?);
    }

    let mut deliveries = stream::select_all(
        consumers
            .into_iter()
            .enumerate()
            .map(|(index, consumer)| consumer.map(move |delivery| (index, delivery)).boxed()),
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                return Ok(());
            }
            next = deliveries.next() => {
                let Some((index, delivery)) = next else {
                    info!("consumer stream ended");
                    return Ok(());
                };
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(consume_error) => {
                        error!(error = %consume_error, "failed to consume delivery");
                        continue;
                    }
                };
                let Some(binding) = bindings.get(index) else {
                    continue;
                };
                handle(channel, registry, binding, delivery.into()).await;
            }
        }
    }
}

/// Declare `queue` and open a consumer on it.
async fn consume_queue(
    channel: &lapin::Channel,
    queue: &str,
) -> Result<lapin::Consumer, ServeError> {
    channel
        .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
        .await?;
    let consumer = channel
        .basic_consume(
            queue,
            "",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;
    info!(queue, "declared queue");
    Ok(consumer)
}

/// Route one delivery to its handler; broker failures are logged, leaving
/// the delivery unacknowledged for redelivery.
async fn handle(channel: &lapin::Channel, registry: &Registry, binding: &Binding, delivery: Delivery) {
    let result = match binding {
        Binding::Info => introspect::handle_info(channel, registry, delivery).await,
        Binding::Operator(descriptor) => dispatch::dispatch(channel, descriptor, delivery).await,
    };
    if let Err(broker_error) = result {
        error!(error = %broker_error, "failed to publish or acknowledge reply");
    }
}

/// Build the broker URI from settings.
fn amqp_uri(settings: &Settings) -> AMQPUri {
    let mut uri = AMQPUri::default();
    uri.scheme = AMQPScheme::AMQP;
    uri.authority.userinfo.username = settings.username.clone();
    uri.authority.userinfo.password = settings.password.clone();
    uri.authority.host = settings.host.clone();
    uri.authority.port = settings.port;
    uri.vhost = settings.virtual_host.clone();
    uri
}
