// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Per-Delivery Dispatch
//!
//! This module implements the core of the message consumption process: one
//! invocation per delivered message, selecting a handler by routing key,
//! invoking it, and terminating the delivery with exactly one ack or nack.
//! Handler failures are recovered locally and never crash the dispatch loop
//! or other in-flight deliveries.

use crate::{
    errors::AmqpError,
    handler::{HandlerRegistry, Selection},
};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
};
use serde::de::DeserializeOwned;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Consumes and processes one delivery.
///
/// The steps are:
/// 1. An empty payload is logged and dropped without ack or nack; it is the
///    broker's sentinel for a cancelled subscription, not a message.
/// 2. The body is deserialized; a parse failure flows into the failure
///    branch below, keeping the acknowledgment contract uniform.
/// 3. The handler is selected by routing key. In keyed mode a miss is not
///    fatal: the delivery is logged as a warning and acknowledged without
///    invocation, discarding the unroutable message instead of retrying it.
/// 4. On handler success the delivery is acknowledged.
/// 5. On handler failure the failure is logged with its routing key, the
///    configured rejection throttle elapses, and the delivery is rejected
///    with broker-default requeue semantics.
///
/// # Parameters
/// * `delivery` - The delivery to process
/// * `registry` - The consumer's handler configuration
/// * `rejection_throttle` - Delay applied before rejecting a failed delivery
///
/// # Returns
/// Ok(()) on success or AmqpError on ack/nack transport failure
pub(crate) async fn dispatch<M>(
    delivery: Delivery,
    registry: Arc<HandlerRegistry<M>>,
    rejection_throttle: Duration,
) -> Result<(), AmqpError>
where
    M: DeserializeOwned + Send + 'static,
{
    if delivery.data.is_empty() {
        warn!("empty delivery received, dropping");
        return Ok(());
    }

    let routing_key = delivery.routing_key.to_string();
    debug!(routing_key, "delivery received");

    let outcome = match registry.select(&routing_key) {
        Selection::Unroutable => {
            warn!(
                routing_key,
                "removing message from queue, no handler bound for routing key"
            );
            return ack(&delivery).await;
        }
        Selection::CatchAll(handler) => match decode::<M>(&delivery.data) {
            Ok(message) => handler.handle(message, &routing_key).await,
            Err(err) => Err(err),
        },
        Selection::Routed(handler) => match decode::<M>(&delivery.data) {
            Ok(message) => handler.handle(message).await,
            Err(err) => Err(err),
        },
    };

    match outcome {
        Ok(()) => {
            debug!(routing_key, "message successfully processed");
            ack(&delivery).await
        }
        Err(err) => {
            error!(
                error = err.to_string(),
                routing_key,
                message = String::from_utf8_lossy(&delivery.data).into_owned(),
                "handler failure"
            );

            if !rejection_throttle.is_zero() {
                sleep(rejection_throttle).await;
            }

            nack(&delivery).await
        }
    }
}

/// Deserializes a JSON message body.
pub(crate) fn decode<M>(data: &[u8]) -> Result<M, AmqpError>
where
    M: DeserializeOwned,
{
    match serde_json::from_slice::<M>(data) {
        Ok(message) => Ok(message),
        Err(err) => {
            error!(error = err.to_string(), "error parsing message payload");
            Err(AmqpError::ParsePayloadError)
        }
    }
}

async fn ack(delivery: &Delivery) -> Result<(), AmqpError> {
    match delivery.ack(BasicAckOptions { multiple: false }).await {
        Err(err) => {
            error!(error = err.to_string(), "error acking message");
            Err(AmqpError::AckMessageError)
        }
        _ => Ok(()),
    }
}

async fn nack(delivery: &Delivery) -> Result<(), AmqpError> {
    // lapin's nack default suppresses requeue; broker-default redelivery is
    // the contract here.
    match delivery
        .nack(BasicNackOptions {
            multiple: false,
            requeue: true,
        })
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), "error nacking message");
            Err(AmqpError::NackMessageError)
        }
        _ => Ok(()),
    }
}
