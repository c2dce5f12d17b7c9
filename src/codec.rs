//! Record Codec
//!
//! The on-disk serialization format is a pluggable seam. A codec turns a
//! [`Record`] into a self-describing byte envelope and back; every record
//! field must round-trip. The default is compact JSON.

use bytes::Bytes;

use crate::error::Result;
use crate::record::Record;

/// Encodes and decodes record envelopes for the persistence layer
pub trait RecordCodec: Send + Sync {
    /// Serialize a record into its on-disk envelope.
    fn encode(&self, record: &Record) -> Result<Bytes>;

    /// Deserialize an envelope. Fails on torn or foreign bytes.
    fn decode(&self, bytes: &[u8]) -> Result<Record>;

    /// Short name for logging.
    fn name(&self) -> &'static str;
}

/// Default codec: compact JSON envelopes
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl RecordCodec for JsonCodec {
    fn encode(&self, record: &Record) -> Result<Bytes> {
        let buf = serde_json::to_vec(record)?;
        Ok(Bytes::from(buf))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Record> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

// =============================================================================
// Tests
// =============================================================================
