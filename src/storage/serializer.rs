// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Key serializers used to record map keys as scope members.

use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::traits::StorageError;

pub trait KeySerializer<K>: Send + Sync {
    fn serialize_key(&self, key: &K) -> Result<String, StorageError>;
    fn deserialize_key(&self, raw: &str) -> Result<K, StorageError>;
}

/// Round-trips keys through `Display` / `FromStr`.
pub struct DisplayKeySerializer<K>(PhantomData<fn() -> K>);

impl<K> DisplayKeySerializer<K> {
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<K> Default for DisplayKeySerializer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeySerializer<K> for DisplayKeySerializer<K>
where
    K: Display + FromStr,
    K::Err: Display,
{
    fn serialize_key(&self, key: &K) -> Result<String, StorageError> {
        Ok(key.to_string())
    }

    fn deserialize_key(&self, raw: &str) -> Result<K, StorageError> {
        raw.parse()
            .map_err(|e: K::Err| StorageError::Serialization(format!("'{}': {}", raw, e)))
    }
}

/// Round-trips keys through compact JSON.
pub struct JsonKeySerializer<K>(PhantomData<fn() -> K>);

impl<K> JsonKeySerializer<K> {
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<K> Default for JsonKeySerializer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeySerializer<K> for JsonKeySerializer<K>
where
    K: Serialize + DeserializeOwned,
{
    fn serialize_key(&self, key: &K) -> Result<String, StorageError> {
        serde_json::to_string(key).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn deserialize_key(&self, raw: &str) -> Result<K, StorageError> {
        serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_display_serializer_roundtrip() {
        let serializer = DisplayKeySerializer::<u64>::new();
        let raw = serializer.serialize_key(&42).unwrap();
        assert_eq!(raw, "42");
        assert_eq!(serializer.deserialize_key(&raw).unwrap(), 42);
    }

    #[test]
    fn test_display_serializer_rejects_garbage() {
        let serializer = DisplayKeySerializer::<u64>::new();
        let err = serializer.deserialize_key("not-a-number").unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct CompositeKey {
        tenant: String,
        id: u32,
    }

    #[test]
    fn test_json_serializer_composite_key() {
        let serializer = JsonKeySerializer::<CompositeKey>::new();
        let key = CompositeKey { tenant: "acme:eu".into(), id: 7 };
        let raw = serializer.serialize_key(&key).unwrap();
        assert_eq!(serializer.deserialize_key(&raw).unwrap(), key);
    }
}
