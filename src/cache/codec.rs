//! Value encoding for the backing store.
//!
//! Every value crosses the store boundary as canonical JSON bytes behind a
//! one-byte format tag, with zstd compression applied to payloads above a
//! configured threshold. Decoding reverses the pipeline; a payload that fails
//! to decode is reported so the coordinator can treat it as a miss.

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

use crate::config::CodecConfig;

/// Format tag for a plain JSON payload.
const TAG_JSON: u8 = 0x00;
/// Format tag for a zstd-compressed JSON payload.
const TAG_JSON_ZSTD: u8 = 0x01;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("value could not be encoded as JSON: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("payload could not be decoded: {0}")]
    Decode(String),

    #[error("zstd pipeline failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// Encodes and decodes cache values for the backing store.
pub struct ValueCodec {
    config: CodecConfig,
}

impl ValueCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Encode a value into tagged store bytes.
    pub fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        let json = serde_json::to_vec(value).map_err(CodecError::Encode)?;

        let (tag, payload) = if json.len() >= self.config.compress_threshold {
            let compressed = zstd::encode_all(json.as_slice(), self.config.zstd_level)?;
            (TAG_JSON_ZSTD, compressed)
        } else {
            (TAG_JSON, json)
        };

        let mut framed = Vec::with_capacity(payload.len() + 1);
        framed.push(tag);
        framed.extend_from_slice(&payload);
        Ok(Bytes::from(framed))
    }

    /// Decode tagged store bytes back into a value.
    pub fn decode(&self, raw: &[u8]) -> Result<Value, CodecError> {
        let (tag, payload) = raw
            .split_first()
            .ok_or_else(|| CodecError::Decode("empty payload".to_string()))?;

        let json = match *tag {
            TAG_JSON => payload.to_vec(),
            TAG_JSON_ZSTD => zstd::decode_all(payload)?,
            other => {
                return Err(CodecError::Decode(format!("unknown format tag 0x{other:02x}")));
            }
        };

        serde_json::from_slice(&json).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> ValueCodec {
        ValueCodec::new(CodecConfig::default())
    }

    #[test]
    fn test_small_value_stays_plain() {
        let c = codec();
        let value = json!({"name": "Ana", "score": 100});
        let encoded = c.encode(&value).unwrap();
        assert_eq!(encoded[0], TAG_JSON);
        assert_eq!(c.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_large_value_is_compressed() {
        let c = codec();
        let value = json!({"body": "x".repeat(16 * 1024)});
        let encoded = c.encode(&value).unwrap();
        assert_eq!(encoded[0], TAG_JSON_ZSTD);
        assert!(encoded.len() < 16 * 1024);
        assert_eq!(c.decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let c = codec();
        assert!(c.decode(&[0x7f, b'{', b'}']).is_err());
    }

    #[test]
    fn test_garbage_payload_rejected() {
        let c = codec();
        assert!(c.decode(&[]).is_err());
        assert!(c.decode(&[TAG_JSON, 0xff, 0xfe]).is_err());
        assert!(c.decode(&[TAG_JSON_ZSTD, 0x00, 0x01]).is_err());
    }
}
