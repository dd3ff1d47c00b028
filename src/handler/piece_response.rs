use super::resolver::MessageHandler;
use super::HandlerError;
use crate::merkle::PieceHash;
use crate::peer::{Message, MessageKind, PeerContext};
use async_trait::async_trait;
use tracing::{debug, trace};

/// Verifies received pieces against the tree before storing them.
///
/// The leaf hash is recomputed from the received bytes, never taken from
/// the message, so a peer sending tampered bytes fails verification and
/// the response is dropped with no side effects.
pub struct PieceResponseHandler;

#[async_trait]
impl MessageHandler for PieceResponseHandler {
    fn kind(&self) -> MessageKind {
        MessageKind::PieceResponse
    }

    async fn handle(
        &self,
        context: &PeerContext,
        message: Message,
    ) -> Result<Option<Message>, HandlerError> {
        let Message::PieceResponse {
            index, path, data, ..
        } = message
        else {
            return Ok(None);
        };
        let file = &context.shared_file;

        if index >= file.piece_count() as u64 {
            debug!(index, "response outside piece range, dropped");
            return Ok(None);
        }

        let item_hash = PieceHash::digest(&data);
        if !file.try_add(index as usize, item_hash, &path) {
            debug!(index, "piece failed verification, dropped");
            return Ok(None);
        }

        context.store.write_piece(file.hash(), index, data).await?;
        trace!(index, "piece verified and stored");
        Ok(None)
    }
}
