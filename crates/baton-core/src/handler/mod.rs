//! Inbound message handler infrastructure
//!
//! Every decoded wire message is dispatched by kind tag to a registered
//! [`MessageHandler`]. Kinds nobody registered for are logged and dropped.

pub mod lock;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use baton_api::Message;

/// Handler for one message kind
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message);

    /// Kind tag this handler accepts
    fn can_handle(&self) -> &'static str;
}

/// Dispatch table from kind tag to handler
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn MessageHandler>) {
        self.handlers.insert(handler.can_handle(), handler);
    }

    pub async fn dispatch(&self, message: Message) {
        match self.handlers.get(message.kind()) {
            Some(handler) => handler.handle(message).await,
            None => warn!("No handler registered for message kind '{}'", message.kind()),
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}
