use super::{HandlerError, PieceRequestHandler, PieceResponseHandler};
use crate::peer::{Message, MessageKind, PeerContext};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Handles one kind of inbound message.
///
/// Returning `Ok(Some(reply))` sends `reply` back to the peer before the
/// next message is dispatched; `Ok(None)` sends nothing.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// The message kind this handler accepts.
    fn kind(&self) -> MessageKind;

    async fn handle(
        &self,
        context: &PeerContext,
        message: Message,
    ) -> Result<Option<Message>, HandlerError>;
}

/// Maps message kinds to their handlers.
pub struct HandlerResolver {
    handlers: HashMap<MessageKind, Arc<dyn MessageHandler>>,
}

impl HandlerResolver {
    /// An empty resolver; every message is ignored until handlers are
    /// registered.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A resolver with the two piece-exchange handlers registered.
    pub fn with_defaults() -> Self {
        let mut resolver = Self::new();
        resolver.register(Arc::new(PieceRequestHandler));
        resolver.register(Arc::new(PieceResponseHandler));
        resolver
    }

    /// Registers `handler` for its kind, replacing any prior handler.
    pub fn register(&mut self, handler: Arc<dyn MessageHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    /// Routes `message` to the handler for its kind. Messages without a
    /// handler are dropped.
    pub async fn dispatch(
        &self,
        context: &PeerContext,
        message: Message,
    ) -> Result<Option<Message>, HandlerError> {
        match self.handlers.get(&message.kind()) {
            Some(handler) => handler.handle(context, message).await,
            None => {
                trace!(kind = ?message.kind(), "no handler registered, ignoring message");
                Ok(None)
            }
        }
    }
}

impl Default for HandlerResolver {
    fn default() -> Self {
        Self::new()
    }
}
