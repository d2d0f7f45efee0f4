// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Handlers
//!
//! This module defines the handler traits invoked by the consumer dispatch
//! engine and the registry that holds them. A consumer carries exactly one
//! registry, fixed at construction time: either a single catch-all handler
//! receiving every delivery together with its routing key, or a table of
//! dedicated handlers keyed by routing key. The registry is a sum type, so a
//! consumer with no handler at all cannot be constructed.

use crate::errors::AmqpError;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};

/// Handler receiving every delivery on the queue, together with the routing
/// key the message was published with.
#[async_trait]
pub trait CatchAllHandler<M>: Send + Sync {
    async fn handle(&self, message: M, routing_key: &str) -> Result<(), AmqpError>;
}

/// Handler dedicated to a single routing key.
#[async_trait]
pub trait RoutedHandler<M>: Send + Sync {
    async fn handle(&self, message: M) -> Result<(), AmqpError>;
}

/// The handler configuration of a consumer.
///
/// `CatchAll` receives every delivery; `Keyed` dispatches on exact routing-key
/// equality. Immutable once the consumer is constructed.
pub enum HandlerRegistry<M> {
    CatchAll(Arc<dyn CatchAllHandler<M>>),
    Keyed(HashMap<String, Arc<dyn RoutedHandler<M>>>),
}

/// Outcome of looking a routing key up in a registry.
pub(crate) enum Selection<M> {
    CatchAll(Arc<dyn CatchAllHandler<M>>),
    Routed(Arc<dyn RoutedHandler<M>>),
    Unroutable,
}

impl<M> HandlerRegistry<M> {
    /// The routing keys the consumer queue must be bound with.
    ///
    /// A catch-all registry binds once with the empty key; a keyed registry
    /// binds once per registered key.
    pub(crate) fn routing_keys(&self) -> Vec<String> {
        match self {
            HandlerRegistry::CatchAll(_) => vec![String::new()],
            HandlerRegistry::Keyed(table) => table.keys().cloned().collect(),
        }
    }

    /// Selects the handler for a delivered routing key.
    pub(crate) fn select(&self, routing_key: &str) -> Selection<M> {
        match self {
            HandlerRegistry::CatchAll(handler) => Selection::CatchAll(handler.clone()),
            HandlerRegistry::Keyed(table) => match table.get(routing_key) {
                Some(handler) => Selection::Routed(handler.clone()),
                None => Selection::Unroutable,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Greeting {
        name: String,
    }

    mock! {
        CatchAll {}

        #[async_trait]
        impl CatchAllHandler<Greeting> for CatchAll {
            async fn handle(&self, message: Greeting, routing_key: &str) -> Result<(), AmqpError>;
        }
    }

    mock! {
        Routed {}

        #[async_trait]
        impl RoutedHandler<Greeting> for Routed {
            async fn handle(&self, message: Greeting) -> Result<(), AmqpError>;
        }
    }

    fn keyed_registry() -> HandlerRegistry<Greeting> {
        let mut table: HashMap<String, Arc<dyn RoutedHandler<Greeting>>> = HashMap::new();
        table.insert("hello".to_owned(), Arc::new(MockRouted::new()));
        table.insert("goodbye".to_owned(), Arc::new(MockRouted::new()));
        HandlerRegistry::Keyed(table)
    }

    #[test]
    fn should_bind_catch_all_with_empty_key() {
        let registry = HandlerRegistry::CatchAll(Arc::new(MockCatchAll::new()));

        assert_eq!(registry.routing_keys(), vec![String::new()]);
    }

    #[test]
    fn should_bind_keyed_registry_once_per_key() {
        let mut keys = keyed_registry().routing_keys();
        keys.sort();

        assert_eq!(keys, vec!["goodbye".to_owned(), "hello".to_owned()]);
    }

    #[test]
    fn should_select_catch_all_for_any_key() {
        let registry = HandlerRegistry::CatchAll(Arc::new(MockCatchAll::new()));

        assert!(matches!(registry.select(""), Selection::CatchAll(_)));
        assert!(matches!(registry.select("unknown"), Selection::CatchAll(_)));
    }

    #[test]
    fn should_select_routed_handler_on_exact_key() {
        let registry = keyed_registry();

        assert!(matches!(registry.select("hello"), Selection::Routed(_)));
        assert!(matches!(registry.select("goodbye"), Selection::Routed(_)));
    }

    #[test]
    fn should_report_unroutable_key() {
        let registry = keyed_registry();

        assert!(matches!(registry.select("unknown"), Selection::Unroutable));
        assert!(matches!(registry.select(""), Selection::Unroutable));
    }

    #[tokio::test]
    async fn should_invoke_selected_handler_with_message() {
        let mut handler = MockRouted::new();
        handler
            .expect_handle()
            .withf(|message| message.name == "John Doe")
            .times(1)
            .returning(|_| Ok(()));

        let mut table: HashMap<String, Arc<dyn RoutedHandler<Greeting>>> = HashMap::new();
        table.insert("hello".to_owned(), Arc::new(handler));
        let registry = HandlerRegistry::Keyed(table);

        let Selection::Routed(selected) = registry.select("hello") else {
            panic!("expected a routed handler");
        };

        let result = selected
            .handle(Greeting {
                name: "John Doe".to_owned(),
            })
            .await;

        assert!(result.is_ok());
    }
}
