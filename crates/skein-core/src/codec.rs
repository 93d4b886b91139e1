//! Payload codec boundary.
//!
//! Writers and subscribers must share a codec: the backend treats every
//! payload as an opaque blob and delegates byte encoding entirely to the
//! injected codec. Codec failures surface as [`CoordError::Codec`] and
//! propagate unchanged through the storage layer.

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::Value;

use crate::error::{CoordError, Result};

/// Two-function encode/decode capability over opaque values.
pub trait Codec: Send + Sync {
    /// Encodes a value into payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Codec`] if serialization fails.
    fn encode(&self, value: &Value) -> Result<Bytes>;

    /// Decodes payload bytes back into a value.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Codec`] if the bytes are not a valid encoding.
    fn decode(&self, bytes: &[u8]) -> Result<Value>;
}

/// Plain JSON codec, no compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| CoordError::codec(format!("json encode: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| CoordError::codec(format!("json decode: {e}")))
    }
}

/// Gzip-compressed JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

impl Codec for GzipCodec {
    fn encode(&self, value: &Value) -> Result<Bytes> {
        let json = serde_json::to_vec(value)
            .map_err(|e| CoordError::codec(format!("json encode: {e}")))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json)
            .map_err(|e| CoordError::codec(format!("gzip encode: {e}")))?;
        encoder
            .finish()
            .map(Bytes::from)
            .map_err(|e| CoordError::codec(format!("gzip finish: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let mut decoder = GzDecoder::new(bytes);
        let mut json = Vec::new();
        decoder
            .read_to_end(&mut json)
            .map_err(|e| CoordError::codec(format!("gzip decode: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| CoordError::codec(format!("json decode: {e}")))
    }
}
