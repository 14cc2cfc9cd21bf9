//! Tagged opaque provider state
//!
//! Provider specific bookkeeping (schedule hash caches, refresh snapshots)
//! travels through persistence as a discriminated payload, so the reader can
//! check which provider wrote it before decoding.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult, SourceError};

use super::ProviderKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderData {
    pub kind: ProviderKind,
    pub payload: serde_json::Value,
}

impl ProviderData {
    pub fn encode<T: Serialize>(kind: ProviderKind, value: &T) -> AppResult<Self> {
        Ok(Self {
            kind,
            payload: serde_json::to_value(value)?,
        })
    }

    /// Decode the payload, refusing data written by another provider
    pub fn decode<T: DeserializeOwned>(&self, expected: ProviderKind) -> AppResult<T> {
        if self.kind != expected {
            return Err(AppError::Source(SourceError::parse(
                expected.to_string(),
                format!("provider data was written by {}", self.kind),
            )));
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// True when there is nothing to decode
    pub fn is_empty(&self) -> bool {
        match &self.payload {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            serde_json::Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn to_bytes(&self) -> AppResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_decode_rejects_foreign_kind() {
        let mut cache = BTreeMap::new();
        cache.insert("2024-01-01".to_string(), "abc".to_string());
        let data = ProviderData::encode(ProviderKind::SchedulesDirect, &cache).unwrap();

        let decoded: BTreeMap<String, String> = data.decode(ProviderKind::SchedulesDirect).unwrap();
        assert_eq!(decoded, cache);

        let err = data.decode::<BTreeMap<String, String>>(ProviderKind::Xmltv).unwrap_err();
        assert!(err.to_string().contains("written by schedulesdirect"));
    }

    #[test]
    fn test_empty_payloads() {
        let empty = ProviderData::encode(ProviderKind::Xmltv, &BTreeMap::<String, String>::new()).unwrap();
        assert!(empty.is_empty());

        let bytes = empty.to_bytes().unwrap();
        assert_eq!(ProviderData::from_bytes(&bytes).unwrap(), empty);
    }
}
