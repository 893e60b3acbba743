use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Boundary between envelope values and wire text. Both peers pass every
/// outgoing message through [`Codec::encode`] and every incoming frame
/// through [`Codec::decode`], so a custom codec swaps in without touching
/// dispatch or correlation.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<String, CodecError>;
    fn decode(&self, text: &str) -> Result<Value, CodecError>;
}

/// Default codec: plain JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(CodecError::Encode)
    }

    fn decode(&self, text: &str) -> Result<Value, CodecError> {
        serde_json::from_str(text).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip() {
        let codec = JsonCodec;
        let value = json!({"jsonrpc": "2.0", "method": "ping", "id": 1});
        let text = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&text).unwrap(), value);
    }

    #[test]
    fn decode_reports_position() {
        let codec = JsonCodec;
        let err = codec.decode("{not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
        assert!(err.to_string().starts_with("decode failed"));
    }
}
