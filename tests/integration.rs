// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Publisher/consumer integration scenarios against a local broker.
//!
//! These tests need a RabbitMQ instance on `amqp://localhost` and are
//! ignored by default; run them with `cargo test -- --ignored`.

use amqp_helper::{
    dispatcher::{ConsumerClient, ConsumerOptions},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    handler::{CatchAllHandler, RoutedHandler},
    options::ClientOptions,
    publisher::PublisherClient,
    queue::QueueDefinition,
};
use async_trait::async_trait;
use lapin::options::BasicConsumeOptions;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Message {
    name: String,
}

/// Records every invocation so the scenarios can assert on exact calls.
#[derive(Default)]
struct Spy {
    calls: Mutex<Vec<(Message, String)>>,
}

impl Spy {
    fn calls(&self) -> Vec<(Message, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, message: Message, routing_key: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((message, routing_key.to_owned()));
    }
}

#[async_trait]
impl CatchAllHandler<Message> for Spy {
    async fn handle(&self, message: Message, routing_key: &str) -> Result<(), AmqpError> {
        self.record(message, routing_key);
        Ok(())
    }
}

struct RoutedSpy {
    key: String,
    spy: Arc<Spy>,
}

#[async_trait]
impl RoutedHandler<Message> for RoutedSpy {
    async fn handle(&self, message: Message) -> Result<(), AmqpError> {
        self.spy.record(message, &self.key);
        Ok(())
    }
}

/// Fails its first invocation, succeeds afterwards, counting attempts.
#[derive(Default)]
struct FlakyHandler {
    attempts: AtomicUsize,
}

#[async_trait]
impl CatchAllHandler<Message> for FlakyHandler {
    async fn handle(&self, _message: Message, _routing_key: &str) -> Result<(), AmqpError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(AmqpError::ConsumerError("simulated failure".to_owned()));
        }
        Ok(())
    }
}

fn client_options(exchange: &str) -> ClientOptions {
    ClientOptions::new().exchange(ExchangeDefinition::new(exchange).fanout().durable())
}

fn consumer_options(exchange: &str) -> ConsumerOptions {
    ConsumerOptions::new()
        .client(client_options(exchange))
        .queue(QueueDefinition::new("").exclusive())
}

fn spawn_consume(consumer: &Arc<ConsumerClient<Message>>) {
    let consumer = consumer.clone();
    tokio::spawn(async move {
        let _ = consumer.consume(BasicConsumeOptions::default()).await;
    });
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn single_handler_scenario() -> Result<(), AmqpError> {
    let exchange = "amqp-helper-it-single";
    let spy = Arc::new(Spy::default());

    let publisher = PublisherClient::create_and_setup(client_options(exchange)).await?;
    let consumer = Arc::new(
        ConsumerClient::create_and_setup_with_handler(consumer_options(exchange), spy.clone())
            .await?,
    );

    publisher
        .publish(&Message {
            name: "John Doe".to_owned(),
        })
        .await?;

    spawn_consume(&consumer);
    consumer.wait_emptiness(Duration::from_secs(5)).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(
        spy.calls(),
        vec![(
            Message {
                name: "John Doe".to_owned()
            },
            String::new()
        )]
    );

    publisher.tear_down().await?;
    consumer.tear_down().await
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn multi_handler_scenario() -> Result<(), AmqpError> {
    let exchange = "amqp-helper-it-multi";
    let spy = Arc::new(Spy::default());

    let mut table: HashMap<String, Arc<dyn RoutedHandler<Message>>> = HashMap::new();
    for key in ["hello", "goodbye"] {
        table.insert(
            key.to_owned(),
            Arc::new(RoutedSpy {
                key: key.to_owned(),
                spy: spy.clone(),
            }),
        );
    }

    let publisher = PublisherClient::create_and_setup(client_options(exchange)).await?;
    let consumer = Arc::new(
        ConsumerClient::create_and_setup_with_handler_table(consumer_options(exchange), table)
            .await?,
    );

    publisher
        .publish_with_key(
            &Message {
                name: "John Doe".to_owned(),
            },
            "hello",
        )
        .await?;
    publisher
        .publish_with_key(
            &Message {
                name: "Jane Doe".to_owned(),
            },
            "goodbye",
        )
        .await?;

    spawn_consume(&consumer);
    consumer.wait_emptiness(Duration::from_secs(5)).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut calls = spy.calls();
    calls.sort_by(|a, b| a.1.cmp(&b.1));

    assert_eq!(
        calls,
        vec![
            (
                Message {
                    name: "Jane Doe".to_owned()
                },
                "goodbye".to_owned()
            ),
            (
                Message {
                    name: "John Doe".to_owned()
                },
                "hello".to_owned()
            ),
        ]
    );

    publisher.tear_down().await?;
    consumer.tear_down().await
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn unroutable_key_is_discarded() -> Result<(), AmqpError> {
    let exchange = "amqp-helper-it-unroutable";
    let spy = Arc::new(Spy::default());

    let mut table: HashMap<String, Arc<dyn RoutedHandler<Message>>> = HashMap::new();
    table.insert(
        "hello".to_owned(),
        Arc::new(RoutedSpy {
            key: "hello".to_owned(),
            spy: spy.clone(),
        }),
    );

    let publisher = PublisherClient::create_and_setup(client_options(exchange)).await?;
    let consumer = Arc::new(
        ConsumerClient::create_and_setup_with_handler_table(consumer_options(exchange), table)
            .await?,
    );

    publisher
        .publish_with_key(
            &Message {
                name: "John Doe".to_owned(),
            },
            "unknown",
        )
        .await?;

    spawn_consume(&consumer);
    consumer.wait_emptiness(Duration::from_secs(5)).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(spy.calls().is_empty());

    publisher.tear_down().await?;
    consumer.tear_down().await
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn failed_handler_triggers_throttled_redelivery() -> Result<(), AmqpError> {
    let exchange = "amqp-helper-it-redelivery";
    let handler = Arc::new(FlakyHandler::default());

    let options = ConsumerOptions::new()
        .client(client_options(exchange))
        .queue(
            QueueDefinition::new("")
                .exclusive()
                .rejection_throttle(Duration::from_millis(100)),
        );

    let publisher = PublisherClient::create_and_setup(client_options(exchange)).await?;
    let consumer =
        Arc::new(ConsumerClient::create_and_setup_with_handler(options, handler.clone()).await?);

    publisher
        .publish(&Message {
            name: "John Doe".to_owned(),
        })
        .await?;

    spawn_consume(&consumer);

    // An in-flight unacked delivery is invisible to the pending count, so
    // wait for the redelivered attempt before draining.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while handler.attempts.load(Ordering::SeqCst) < 2 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "message was not redelivered in time"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    consumer.wait_emptiness(Duration::from_secs(5)).await?;

    assert_eq!(handler.attempts.load(Ordering::SeqCst), 2);

    publisher.tear_down().await?;
    consumer.tear_down().await
}
