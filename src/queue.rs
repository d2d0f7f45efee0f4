// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Management
//!
//! This module provides types for defining AMQP queues. It covers the
//! standard declaration options plus the rejection throttle applied by the
//! consumer dispatch engine when a handler fails.

use std::time::Duration;

/// Definition of an AMQP queue with its configuration parameters.
///
/// This struct implements the builder pattern to create and configure queue
/// definitions. An empty queue name requests a broker-generated name; the
/// name actually assigned is reported back at declaration time.
#[derive(Debug, Clone, Default)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) passive: bool,
    pub(crate) no_wait: bool,
    pub(crate) rejection_throttle: Duration,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// By default, the queue is created with standard settings (non-durable,
    /// non-exclusive, no rejection throttle).
    ///
    /// # Parameters
    /// * `name` - The name of the queue; empty requests a broker-generated name
    ///
    /// # Returns
    /// A new queue definition with default settings
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            ..QueueDefinition::default()
        }
    }

    /// The configured queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Makes the queue durable, persisting across broker restarts.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the queue to auto-delete when no longer used.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Makes the queue exclusive to the connection.
    ///
    /// Exclusive queues are deleted when the connection closes.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Makes the declaration passive, checking for existence without creating.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    /// Sets the no_wait flag, making the declaration non-blocking.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Sets the delay applied before rejecting a delivery whose handler
    /// failed.
    ///
    /// The throttle provides back-pressure against tight redelivery loops
    /// when the broker requeues rejected messages. Zero by default.
    ///
    /// # Parameters
    /// * `throttle` - The delay to wait before each reject
    ///
    /// # Returns
    /// Self for method chaining
    pub fn rejection_throttle(mut self, throttle: Duration) -> Self {
        self.rejection_throttle = throttle;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_plain_queue() {
        let def = QueueDefinition::new("orders");

        assert_eq!(def.name(), "orders");
        assert!(!def.durable);
        assert!(!def.exclusive);
        assert_eq!(def.rejection_throttle, Duration::ZERO);
    }

    #[test]
    fn should_apply_builder_flags() {
        let def = QueueDefinition::new("")
            .durable()
            .exclusive()
            .rejection_throttle(Duration::from_millis(250));

        assert_eq!(def.name(), "");
        assert!(def.durable);
        assert!(def.exclusive);
        assert_eq!(def.rejection_throttle, Duration::from_millis(250));
    }
}
