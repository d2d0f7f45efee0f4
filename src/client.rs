// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection Management
//!
//! This module handles the creation and teardown of AMQP connections and
//! channels. A [`Client`] owns one connection and one multiplexing channel,
//! declares the configured exchange during setup, and exclusively controls
//! the channel's lifetime; no other component may close it out of band.

use crate::{errors::AmqpError, options::ClientOptions};
use lapin::{
    options::ExchangeDeclareOptions,
    types::{FieldTable, LongString},
    Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Reply code sent with clean channel and connection closes.
const REPLY_SUCCESS: u16 = 200;

/// Owns the broker connection and channel shared by a publisher or consumer.
///
/// The client is constructed without touching the broker; `setup()` performs
/// the connect, channel creation, and exchange declaration. Accessing the
/// connection or channel before `setup()` completes is a precondition
/// violation surfaced as an error, never a panic.
pub struct Client {
    options: ClientOptions,
    connection: Option<Arc<Connection>>,
    channel: Option<Arc<Channel>>,
}

impl Client {
    /// Creates a new client from the given options.
    ///
    /// # Parameters
    /// * `options` - Connection configuration, immutable afterwards
    ///
    /// # Returns
    /// A new Client that has not yet connected
    pub fn new(options: ClientOptions) -> Client {
        Client {
            options,
            connection: None,
            channel: None,
        }
    }

    /// The options the client was constructed with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// The active channel.
    ///
    /// # Returns
    /// The channel, or `AmqpError::ChannelNotInitialized` before setup
    pub fn channel(&self) -> Result<Arc<Channel>, AmqpError> {
        self.channel
            .clone()
            .ok_or(AmqpError::ChannelNotInitialized)
    }

    /// The active connection.
    ///
    /// # Returns
    /// The connection, or `AmqpError::ConnectionNotInitialized` before setup
    pub fn connection(&self) -> Result<Arc<Connection>, AmqpError> {
        self.connection
            .clone()
            .ok_or(AmqpError::ConnectionNotInitialized)
    }

    /// Establishes the connection and channel, then declares the exchange.
    ///
    /// Declaration is idempotent if the exchange already exists with matching
    /// properties. On failure the instance must be treated as unusable and
    /// discarded; no partial-setup rollback is performed.
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn setup(&mut self) -> Result<(), AmqpError> {
        debug!("creating amqp connection...");
        let properties = ConnectionProperties::default()
            .with_connection_name(LongString::from(self.options.connection_name.clone()));

        let connection = match Connection::connect(&self.options.amqp_url, properties).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                Err(AmqpError::ConnectionError)
            }
        }?;
        debug!("amqp connected");

        debug!("creating amqp channel...");
        let channel = match connection.create_channel().await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError)
            }
        }?;
        debug!("channel created");

        let exchange = &self.options.exchange;
        debug!("creating exchange: {}", exchange.name);

        match channel
            .exchange_declare(
                &exchange.name,
                exchange.kind.clone().into(),
                ExchangeDeclareOptions {
                    passive: exchange.passive,
                    durable: exchange.durable,
                    auto_delete: exchange.delete,
                    internal: exchange.internal,
                    nowait: exchange.no_wait,
                },
                FieldTable::from(exchange.params.clone()),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = exchange.name,
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(exchange.name.clone()))
            }
            _ => Ok(()),
        }?;
        debug!("exchange: {} was created", exchange.name);

        self.connection = Some(Arc::new(connection));
        self.channel = Some(Arc::new(channel));

        Ok(())
    }

    /// Closes the channel, then the connection, releasing all resources.
    ///
    /// Fails fast with the precondition error if called before `setup()`.
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn tear_down(&self) -> Result<(), AmqpError> {
        let channel = self.channel()?;
        let connection = self.connection()?;

        if let Err(err) = channel.close(REPLY_SUCCESS, "client teardown").await {
            error!(error = err.to_string(), "error to close the channel");
            return Err(AmqpError::ChannelError);
        }

        if let Err(err) = connection.close(REPLY_SUCCESS, "client teardown").await {
            error!(error = err.to_string(), "error to close the connection");
            return Err(AmqpError::ConnectionError);
        }

        debug!("amqp client teardown complete");

        Ok(())
    }
}
