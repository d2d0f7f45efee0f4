// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the AMQP Helper
//!
//! This module provides the set of error types for AMQP operations.
//! The `AmqpError` enum represents all failure scenarios that can occur during
//! connection, channel, exchange, queue, publish, and dispatch operations.

use thiserror::Error;

/// Represents errors that can occur during AMQP operations.
///
/// This enum covers all error scenarios for broker interactions, including
/// precondition violations (accessing the connection or channel before setup),
/// setup failures, message publishing, and consumer-side dispatch errors.
/// Each variant provides specific context about what operation failed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// The connection was accessed before `setup()` completed
    #[error("connection not initialized")]
    ConnectionNotInitialized,

    /// The channel was accessed before `setup()` completed
    #[error("channel not initialized")]
    ChannelNotInitialized,

    /// The consumer queue was used before `setup()` completed
    #[error("queue not initialized")]
    QueueNotInitialized,

    /// Error establishing or closing a connection to the broker
    #[error("connection failure")]
    ConnectionError,

    /// Error creating or closing a channel
    #[error("channel failure")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{0}` to exchange `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error registering a consumer on a queue
    #[error("failure to declare consumer on queue `{0}`")]
    ConsumerDeclarationError(String),

    /// Error serializing a message payload for publishing
    #[error("failure to serialize payload")]
    SerializePayloadError,

    /// Error parsing a received message payload
    #[error("failure to parse payload")]
    ParsePayloadError,

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error inspecting a queue for its pending-message count
    #[error("failure to inspect queue `{0}`")]
    InspectQueueError(String),

    /// The queue still held pending messages when the drain patience expired
    #[error("queue `{0}` did not drain in time")]
    DrainTimeoutError(String),

    /// Error raised by a message handler
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),
}
