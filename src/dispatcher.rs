// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Dispatch Engine
//!
//! This module provides the consuming side of the crate. A
//! [`ConsumerClient`] declares and binds its queue during setup, then pulls
//! deliveries from the broker and dispatches each one to the registered
//! handler configuration. Each delivery is dispatched on its own task, so a
//! hanging handler never blocks other in-flight deliveries.
//!
//! The lifecycle of a consumer is linear: construct, `setup()`, `consume()`,
//! `tear_down()`. Consuming ends when teardown closes the channel; there is
//! no separate cancellation API.

use crate::{
    client::Client,
    consumer::dispatch,
    errors::AmqpError,
    handler::{CatchAllHandler, HandlerRegistry, RoutedHandler},
    options::ClientOptions,
    queue::QueueDefinition,
};
use futures_util::{future::join_all, StreamExt};
use lapin::{
    options::{BasicConsumeOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
};
use serde::de::DeserializeOwned;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Interval between pending-count polls while draining a queue.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for a consumer: connection options plus queue definition.
///
/// The default queue has no name (the broker assigns one at declaration
/// time) and is durable.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub(crate) client: ClientOptions,
    pub(crate) queue: QueueDefinition,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        ConsumerOptions {
            client: ClientOptions::default(),
            queue: QueueDefinition::new("").durable(),
        }
    }
}

impl ConsumerOptions {
    /// Creates consumer options with the defaults.
    ///
    /// # Returns
    /// A new ConsumerOptions with default settings
    pub fn new() -> ConsumerOptions {
        ConsumerOptions::default()
    }

    /// Sets the connection options.
    ///
    /// # Parameters
    /// * `client` - Connection configuration
    ///
    /// # Returns
    /// Self for method chaining
    pub fn client(mut self, client: ClientOptions) -> Self {
        self.client = client;
        self
    }

    /// Sets the queue definition.
    ///
    /// # Parameters
    /// * `queue` - Queue configuration
    ///
    /// # Returns
    /// Self for method chaining
    pub fn queue(mut self, queue: QueueDefinition) -> Self {
        self.queue = queue;
        self
    }
}

/// Consumes typed messages from a queue bound to the configured exchange.
///
/// The handler configuration is fixed at construction time: either one
/// catch-all handler, or a table of handlers keyed by routing key. The two
/// tagged constructors funnel through one internal constructor, so a
/// consumer without handlers cannot exist.
pub struct ConsumerClient<M> {
    client: Client,
    queue: QueueDefinition,
    handlers: Arc<HandlerRegistry<M>>,
    effective_queue: Option<String>,
}

impl<M> ConsumerClient<M>
where
    M: DeserializeOwned + Send + 'static,
{
    /// Creates a consumer with a single catch-all handler.
    ///
    /// The queue is bound once with the empty routing key; the handler
    /// receives every delivery together with its routing key.
    ///
    /// # Parameters
    /// * `options` - Consumer configuration
    /// * `handler` - Handler receiving every delivery
    ///
    /// # Returns
    /// A new ConsumerClient that has not yet connected
    pub fn with_handler(
        options: ConsumerOptions,
        handler: Arc<dyn CatchAllHandler<M>>,
    ) -> ConsumerClient<M> {
        ConsumerClient::new(options, HandlerRegistry::CatchAll(handler))
    }

    /// Creates a consumer with a table of handlers keyed by routing key.
    ///
    /// The queue is bound once per registered key; deliveries dispatch on
    /// exact routing-key equality.
    ///
    /// # Parameters
    /// * `options` - Consumer configuration
    /// * `table` - Handlers keyed by routing key
    ///
    /// # Returns
    /// A new ConsumerClient that has not yet connected
    pub fn with_handler_table(
        options: ConsumerOptions,
        table: HashMap<String, Arc<dyn RoutedHandler<M>>>,
    ) -> ConsumerClient<M> {
        ConsumerClient::new(options, HandlerRegistry::Keyed(table))
    }

    /// Creates a catch-all consumer and runs its setup in one step.
    ///
    /// # Parameters
    /// * `options` - Consumer configuration
    /// * `handler` - Handler receiving every delivery
    ///
    /// # Returns
    /// A ready consumer on success or AmqpError on failure
    pub async fn create_and_setup_with_handler(
        options: ConsumerOptions,
        handler: Arc<dyn CatchAllHandler<M>>,
    ) -> Result<ConsumerClient<M>, AmqpError> {
        let mut consumer = ConsumerClient::with_handler(options, handler);
        consumer.setup().await?;

        Ok(consumer)
    }

    /// Creates a keyed consumer and runs its setup in one step.
    ///
    /// # Parameters
    /// * `options` - Consumer configuration
    /// * `table` - Handlers keyed by routing key
    ///
    /// # Returns
    /// A ready consumer on success or AmqpError on failure
    pub async fn create_and_setup_with_handler_table(
        options: ConsumerOptions,
        table: HashMap<String, Arc<dyn RoutedHandler<M>>>,
    ) -> Result<ConsumerClient<M>, AmqpError> {
        let mut consumer = ConsumerClient::with_handler_table(options, table);
        consumer.setup().await?;

        Ok(consumer)
    }

    fn new(options: ConsumerOptions, handlers: HandlerRegistry<M>) -> ConsumerClient<M> {
        ConsumerClient {
            client: Client::new(options.client),
            queue: options.queue,
            handlers: Arc::new(handlers),
            effective_queue: None,
        }
    }

    /// The queue name assigned at setup: the broker-generated name when the
    /// configured name was empty, the configured name otherwise.
    pub fn effective_queue(&self) -> Option<&str> {
        self.effective_queue.as_deref()
    }

    /// Establishes the connection, declares the queue, and binds it to the
    /// exchange once per registered routing key.
    ///
    /// Binds run concurrently; setup completes only when every bind
    /// succeeds. The broker-reported queue name is recorded and used by all
    /// subsequent operations.
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn setup(&mut self) -> Result<(), AmqpError> {
        self.client.setup().await?;
        let channel = self.client.channel()?;

        debug!("creating queue: {}", self.queue.name);
        let queue = match channel
            .queue_declare(
                &self.queue.name,
                QueueDeclareOptions {
                    passive: self.queue.passive,
                    durable: self.queue.durable,
                    exclusive: self.queue.exclusive,
                    auto_delete: self.queue.delete,
                    nowait: self.queue.no_wait,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to declare the queue");
                Err(AmqpError::DeclareQueueError(self.queue.name.clone()))
            }
            Ok(queue) => Ok(queue),
        }?;

        let effective_queue = queue.name().as_str().to_owned();
        let exchange_name = self.client.options().exchange_name().to_owned();

        let binds = self.handlers.routing_keys().into_iter().map(|routing_key| {
            let channel = channel.clone();
            let queue_name = effective_queue.clone();
            let exchange_name = exchange_name.clone();

            async move {
                debug!(
                    "binding queue: {} to the exchange: {} with the key: {}",
                    queue_name, exchange_name, routing_key
                );

                match channel
                    .queue_bind(
                        &queue_name,
                        &exchange_name,
                        &routing_key,
                        QueueBindOptions { nowait: false },
                        FieldTable::default(),
                    )
                    .await
                {
                    Err(err) => {
                        error!(error = err.to_string(), "error to bind queue to exchange");
                        Err(AmqpError::BindingExchangeToQueueError(
                            queue_name,
                            exchange_name,
                        ))
                    }
                    _ => Ok(()),
                }
            }
        });

        for bound in join_all(binds).await {
            bound?;
        }

        info!(queue = effective_queue, "consumer setup complete");
        self.effective_queue = Some(effective_queue);

        Ok(())
    }

    /// Consumes deliveries until the channel closes.
    ///
    /// Each delivery is dispatched on its own task; dispatch failures are
    /// logged and never stop the stream. Errors immediately if called
    /// before `setup()`.
    ///
    /// # Parameters
    /// * `options` - Consume options registered with the broker
    ///
    /// # Returns
    /// Ok(()) once the subscription ends or AmqpError on failure
    pub async fn consume(&self, options: BasicConsumeOptions) -> Result<(), AmqpError> {
        let channel = self.client.channel()?;
        let queue_name = self
            .effective_queue
            .clone()
            .ok_or(AmqpError::QueueNotInitialized)?;

        let mut consumer = match channel
            .basic_consume(&queue_name, "", options, FieldTable::default())
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::ConsumerDeclarationError(queue_name.clone()))
            }
            Ok(consumer) => Ok(consumer),
        }?;

        let throttle = self.queue.rejection_throttle;

        while let Some(result) = consumer.next().await {
            match result {
                Ok(delivery) => {
                    let handlers = self.handlers.clone();

                    tokio::spawn(async move {
                        if let Err(err) = dispatch(delivery, handlers, throttle).await {
                            error!(error = err.to_string(), "error consuming message");
                        }
                    });
                }
                Err(err) => error!(error = err.to_string(), "error receiving delivery"),
            }
        }

        Ok(())
    }

    /// Waits until the queue reports zero pending messages.
    ///
    /// Polls the broker on a short fixed interval, logging progress between
    /// polls. Intended for tests and shutdown coordination, not a hot path.
    ///
    /// # Parameters
    /// * `patience` - How long to keep polling before giving up
    ///
    /// # Returns
    /// Ok(()) once the queue is empty, `DrainTimeoutError` when patience
    /// runs out, or another AmqpError on inspection failure
    pub async fn wait_emptiness(&self, patience: Duration) -> Result<(), AmqpError> {
        let channel = self.client.channel()?;
        let queue_name = self
            .effective_queue
            .clone()
            .ok_or(AmqpError::QueueNotInitialized)?;

        let deadline = Instant::now() + patience;

        loop {
            let state = match channel
                .queue_declare(
                    &queue_name,
                    QueueDeclareOptions {
                        passive: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
            {
                Err(err) => {
                    error!(error = err.to_string(), "error to inspect the queue");
                    Err(AmqpError::InspectQueueError(queue_name.clone()))
                }
                Ok(state) => Ok(state),
            }?;

            let pending = state.message_count();
            if pending == 0 {
                debug!(queue = queue_name, "queue drained");
                return Ok(());
            }

            debug!(queue = queue_name, pending, "queue not empty yet");

            if Instant::now() >= deadline {
                return Err(AmqpError::DrainTimeoutError(queue_name));
            }

            sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    /// Closes the channel and connection, ending the subscription.
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn tear_down(&self) -> Result<(), AmqpError> {
        self.client.tear_down().await
    }
}
