//! Serialization of commands and envelopes.
//!
//! The server talks to the serialization format only through [`Codec`].
//! [`MsgPackCodec`] is the default: named-field `MsgPack` via
//! `rmp_serde::to_vec_named()`, so structs travel as maps.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors from encoding or decoding a value.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Structured-value serialization.
pub trait Codec: Send + Sync + 'static {
    /// Encodes `value` to bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if `value` cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decodes bytes into a `T`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` if the bytes are malformed or do not
    /// match the shape of `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Named-field `MsgPack` codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::envelope::ResponseEnvelope;

    #[test]
    fn command_encodes_as_map_with_named_fields() {
        let codec = MsgPackCodec;
        let cmd = Command::new("orders", "view").with_caller("u1", "127.0.0.1");
        let bytes = codec.encode(&cmd).unwrap();

        let value: rmpv::Value = codec.decode(&bytes).unwrap();
        let map = value.as_map().expect("command should encode as a map");
        let keys: Vec<&str> = map.iter().filter_map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"service"));
        assert!(keys.contains(&"operator"));
        // Absent optionals are omitted rather than sent as nil.
        assert!(!keys.contains(&"signature"));
        assert!(!keys.contains(&"param"));
    }

    #[test]
    fn command_decodes_with_missing_fields() {
        let codec = MsgPackCodec;
        let raw = rmpv::Value::Map(vec![(
            rmpv::Value::from("service"),
            rmpv::Value::from("orders"),
        )]);
        let bytes = codec.encode(&raw).unwrap();
        let cmd: Command = codec.decode(&bytes).unwrap();
        assert_eq!(cmd.service.as_deref(), Some("orders"));
        assert!(cmd.method.is_none());
        assert!(cmd.signature.is_none());
        assert!(cmd.operator.is_empty());
    }

    #[test]
    fn envelope_survives_encoding() {
        let codec = MsgPackCodec;
        let data = rmpv::Value::Map(vec![(
            rmpv::Value::from("items"),
            rmpv::Value::Array(vec![rmpv::Value::from(1), rmpv::Value::from(true)]),
        )]);
        let env = ResponseEnvelope::success(data);
        let decoded: ResponseEnvelope = codec.decode(&codec.encode(&env).unwrap()).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let codec = MsgPackCodec;
        let err = codec.decode::<Command>(&[0xc1, 0xff, 0x00]).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
