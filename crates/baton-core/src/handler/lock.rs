//! Handlers routing lock protocol messages into the engine

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use baton_api::Message;
use baton_lock::TokenLock;

use super::MessageHandler;

pub struct RequestTokenHandler {
    lock: Arc<TokenLock>,
}

impl RequestTokenHandler {
    pub fn new(lock: Arc<TokenLock>) -> Self {
        Self { lock }
    }
}

#[async_trait]
impl MessageHandler for RequestTokenHandler {
    async fn handle(&self, message: Message) {
        match message {
            Message::RequestToken { time, requester } => {
                self.lock.handle_request_token(time, requester).await;
            }
            other => warn!("RequestTokenHandler received '{}'", other.kind()),
        }
    }

    fn can_handle(&self) -> &'static str {
        "request_token"
    }
}

pub struct GiveTokenHandler {
    lock: Arc<TokenLock>,
}

impl GiveTokenHandler {
    pub fn new(lock: Arc<TokenLock>) -> Self {
        Self { lock }
    }
}

#[async_trait]
impl MessageHandler for GiveTokenHandler {
    async fn handle(&self, message: Message) {
        match message {
            Message::GiveToken { token } => {
                self.lock.handle_give_token(token).await;
            }
            other => warn!("GiveTokenHandler received '{}'", other.kind()),
        }
    }

    fn can_handle(&self) -> &'static str {
        "give_token"
    }
}
