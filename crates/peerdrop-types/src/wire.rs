use serde::{Deserialize, Serialize};

use crate::models::{Ack, ChunkHeader, TransferMetadata};

/// JSON messages exchanged over a data channel.
///
/// Every text message is one of these. A `Chunk` header also prefixes each
/// packed binary frame, and in paired mode travels as its own text message
/// just before the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Announces a new transfer
    Metadata(TransferMetadata),

    /// Describes the chunk payload that accompanies it
    Chunk(ChunkHeader),

    /// Acknowledges one chunk
    Ack(Ack),

    /// Plain chat text
    Chat { text: String },
}

impl ControlMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransferId;

    #[test]
    fn chunk_header_wire_shape() {
        let id = TransferId::new();
        let msg = ControlMessage::Chunk(ChunkHeader { transfer_id: id, chunk_index: 7 });
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "chunk");
        assert_eq!(json["fileId"], id.to_string());
        assert_eq!(json["chunkIndex"], 7);
    }

    #[test]
    fn ack_parses_from_peer_json() {
        let id = TransferId::new();
        let text = format!(r#"{{"type":"ack","fileId":"{}","chunkIndex":3}}"#, id);
        let msg = ControlMessage::from_json(&text).unwrap();
        assert_eq!(msg, ControlMessage::Ack(Ack { transfer_id: id, chunk_index: 3 }));
    }

    #[test]
    fn metadata_is_tagged() {
        let id = TransferId::new();
        let msg = ControlMessage::Metadata(TransferMetadata {
            transfer_id: id,
            file_name: "a.bin".into(),
            mime_type: "application/octet-stream".into(),
            file_size: 0,
            chunk_size: 16,
            total_chunks: 0,
            sha256: None,
        });
        let text = msg.to_json().unwrap();
        assert!(text.contains(r#""type":"metadata""#));
        assert_eq!(ControlMessage::from_json(&text).unwrap(), msg);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(ControlMessage::from_json(r#"{"type":"offer","sdp":""}"#).is_err());
        assert!(ControlMessage::from_json("not json").is_err());
    }
}
