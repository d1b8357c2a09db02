/*
   This module specifies the API by which application code receives verified webhooks.
*/

use crate::domain::payload::Payload;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Error type for handler execution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Handler task aborted: {0}")]
    Aborted(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// A verified webhook as seen by handlers: the envelope's message ID plus the parsed payload
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub message_id: String,
    pub payload: Payload,
}

impl InboundEvent {
    pub fn new(message_id: impl Into<String>, payload: Payload) -> Self {
        Self {
            message_id: message_id.into(),
            payload,
        }
    }

    pub fn event(&self) -> &str {
        &self.payload.event
    }
}

/// Trait for handling verified webhook events
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle(&self, event: &InboundEvent) -> Result<(), HandlerError>;
    fn name(&self) -> &str {
        "UnnamedHandler"
    }
}

/// Shared handler reference; registry identity is pointer identity
pub type SharedHandler = Arc<dyn WebhookHandler>;

/// Adapter turning an async closure into a [`WebhookHandler`]
pub struct HandlerFn<F> {
    name: String,
    func: F,
}

/// Wrap an async closure as a shareable handler.
///
/// The closure receives an owned copy of the event so its future can be `'static`.
pub fn handler_fn<F, Fut>(name: impl Into<String>, func: F) -> SharedHandler
where
    F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(HandlerFn {
        name: name.into(),
        func,
    })
}

#[async_trait]
impl<F, Fut> WebhookHandler for HandlerFn<F>
where
    F: Fn(InboundEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, event: &InboundEvent) -> Result<(), HandlerError> {
        (self.func)(event.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
