//! Topic codecs.
//!
//! Every stream and the state table carry JSON. The codec trait exists
//! so the table and the processor do not care how bytes map to values,
//! mirroring how the group definition wires one codec per topic.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ProcessorResult;

/// Bidirectional byte codec for one topic's values.
pub trait Codec {
    type Value;

    fn encode(&self, value: &Self::Value) -> ProcessorResult<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> ProcessorResult<Self::Value>;
}

/// JSON codec for any serde-capable value.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type Value = T;

    fn encode(&self, value: &T) -> ProcessorResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> ProcessorResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
