use super::resolver::MessageHandler;
use super::HandlerError;
use crate::merkle::PieceHash;
use crate::peer::{Message, MessageKind, PeerContext};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Serves piece requests from the local tree and piece store.
///
/// Declines (no reply) whenever the piece cannot be served verifiably:
/// unknown index, piece not held, incomplete sibling path, or missing
/// bytes. A remote peer can never make this handler panic or corrupt
/// state.
pub struct PieceRequestHandler;

#[async_trait]
impl MessageHandler for PieceRequestHandler {
    fn kind(&self) -> MessageKind {
        MessageKind::PieceRequest
    }

    async fn handle(
        &self,
        context: &PeerContext,
        message: Message,
    ) -> Result<Option<Message>, HandlerError> {
        let Message::PieceRequest { index } = message else {
            return Ok(None);
        };
        let file = &context.shared_file;

        if index >= file.piece_count() as u64 {
            debug!(index, "request outside piece range");
            return Ok(None);
        }
        let leaf_hash = file.piece_hash(index as usize);
        if leaf_hash.is_empty() {
            debug!(index, "piece not held, declining request");
            return Ok(None);
        }
        let path = file.path(index as usize);
        if path.iter().any(PieceHash::is_empty) {
            debug!(index, "sibling path incomplete, declining request");
            return Ok(None);
        }

        let Some(data) = context.store.read_piece(file.hash(), index).await? else {
            warn!(index, "piece marked held but bytes missing from store");
            return Ok(None);
        };

        Ok(Some(Message::PieceResponse {
            index,
            leaf_hash,
            path,
            data,
        }))
    }
}
