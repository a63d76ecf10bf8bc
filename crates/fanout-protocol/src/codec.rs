//! Bincode framing for tasks, results and callable payloads.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ProtocolError;

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(bincode::deserialize(bytes)?)
}
