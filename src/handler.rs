//! Per-message-kind handlers and their resolver.
//!
//! Every inbound message, serving or downloading, flows through
//! [`HandlerResolver::dispatch`]: the resolver picks the handler
//! registered for the message's kind and returns its optional reply.
//! The exchanger never looks inside messages itself, so new kinds can be
//! added by registering a handler.

mod piece_request;
mod piece_response;
mod resolver;

pub use piece_request::PieceRequestHandler;
pub use piece_response::PieceResponseHandler;
pub use resolver::{HandlerResolver, MessageHandler};

use crate::store::StoreError;
use thiserror::Error;

/// Errors escaping a message handler. These end the peer session; the
/// surrounding loop logs and contains them.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("piece store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests;
