// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! This module provides the publishing side of the crate. A
//! [`PublisherClient`] serializes a typed message to JSON and hands it to the
//! channel for transport to the configured exchange. Publishing is
//! fire-and-forget: the call does not await broker acknowledgment of
//! persistence, and a transport failure propagates synchronously with no
//! retry.

use crate::{client::Client, errors::AmqpError, options::ClientOptions};
use lapin::{options::BasicPublishOptions, types::ShortString, BasicProperties};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Delivery mode marking a message persistent
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Options applied to a single publish call.
///
/// Messages are marked persistent by default; explicit options override that
/// default. The embedded routing key is used when the publish call itself
/// does not carry one.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub(crate) routing_key: Option<String>,
    pub(crate) persistent: bool,
    pub(crate) mandatory: bool,
    pub(crate) immediate: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        PublishOptions {
            routing_key: None,
            persistent: true,
            mandatory: false,
            immediate: false,
        }
    }
}

impl PublishOptions {
    /// Creates options with the defaults.
    ///
    /// # Returns
    /// A new PublishOptions marking messages persistent
    pub fn new() -> PublishOptions {
        PublishOptions::default()
    }

    /// Sets the routing key carried by these options.
    ///
    /// # Parameters
    /// * `key` - The routing key to attach at publish time
    ///
    /// # Returns
    /// Self for method chaining
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = Some(key.to_owned());
        self
    }

    /// Marks the message transient instead of persistent.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn transient(mut self) -> Self {
        self.persistent = false;
        self
    }

    /// Sets the mandatory publish flag.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Sets the immediate publish flag.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// The routing key these options resolve to when the publish call does
    /// not pass one explicitly. Empty by default (fanout-style delivery).
    pub(crate) fn effective_routing_key(&self) -> &str {
        self.routing_key.as_deref().unwrap_or_default()
    }
}

/// Publishes typed messages to the configured exchange.
pub struct PublisherClient {
    client: Client,
}

impl PublisherClient {
    /// Creates a new publisher from the given options.
    ///
    /// # Parameters
    /// * `options` - Connection configuration
    ///
    /// # Returns
    /// A new PublisherClient that has not yet connected
    pub fn new(options: ClientOptions) -> PublisherClient {
        PublisherClient {
            client: Client::new(options),
        }
    }

    /// Creates a publisher and runs its setup in one step.
    ///
    /// # Parameters
    /// * `options` - Connection configuration
    ///
    /// # Returns
    /// A ready publisher on success or AmqpError on failure
    pub async fn create_and_setup(options: ClientOptions) -> Result<PublisherClient, AmqpError> {
        let mut publisher = PublisherClient::new(options);
        publisher.setup().await?;

        Ok(publisher)
    }

    /// Establishes the connection, channel, and exchange.
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn setup(&mut self) -> Result<(), AmqpError> {
        self.client.setup().await
    }

    /// Closes the channel and connection.
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn tear_down(&self) -> Result<(), AmqpError> {
        self.client.tear_down().await
    }

    /// Publishes a message with the empty routing key and default options.
    ///
    /// # Parameters
    /// * `message` - The message to serialize and send
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn publish<M>(&self, message: &M) -> Result<(), AmqpError>
    where
        M: Serialize + Sync,
    {
        self.send(message, "", &PublishOptions::default()).await
    }

    /// Publishes a message with an explicit routing key.
    ///
    /// # Parameters
    /// * `message` - The message to serialize and send
    /// * `routing_key` - The routing key to attach
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn publish_with_key<M>(
        &self,
        message: &M,
        routing_key: &str,
    ) -> Result<(), AmqpError>
    where
        M: Serialize + Sync,
    {
        self.send(message, routing_key, &PublishOptions::default())
            .await
    }

    /// Publishes a message with explicit publish options.
    ///
    /// The effective routing key is the one embedded in the options, empty by
    /// default.
    ///
    /// # Parameters
    /// * `message` - The message to serialize and send
    /// * `options` - Publish options overriding the defaults
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn publish_with_options<M>(
        &self,
        message: &M,
        options: PublishOptions,
    ) -> Result<(), AmqpError>
    where
        M: Serialize + Sync,
    {
        let routing_key = options.effective_routing_key().to_owned();
        self.send(message, &routing_key, &options).await
    }

    async fn send<M>(
        &self,
        message: &M,
        routing_key: &str,
        options: &PublishOptions,
    ) -> Result<(), AmqpError>
    where
        M: Serialize + Sync,
    {
        let channel = self.client.channel()?;

        let body = match serde_json::to_vec(message) {
            Ok(body) => Ok(body),
            Err(err) => {
                error!(error = err.to_string(), "error serializing message");
                Err(AmqpError::SerializePayloadError)
            }
        }?;

        let mut properties = BasicProperties::default()
            .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()));

        if options.persistent {
            properties = properties.with_delivery_mode(DELIVERY_MODE_PERSISTENT);
        }

        match channel
            .basic_publish(
                self.client.options().exchange_name(),
                routing_key,
                BasicPublishOptions {
                    mandatory: options.mandatory,
                    immediate: options.immediate,
                },
                &body,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            _ => Ok(()),
        }
    }
}
