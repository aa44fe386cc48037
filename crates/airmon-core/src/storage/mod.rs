//! Namespaced key/value persistence
//!
//! Only small integer state survives a reboot (the reboot counter), so a
//! namespace is stored as a single postcard-encoded [`KvRecord`]: a short list
//! of `key -> u64` entries tagged with the namespace name. The record is read
//! and rewritten as a whole.

pub mod sd_card;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

pub use sd_card::SdCardStore;

/// Longest namespace or key name, in bytes.
pub const MAX_KEY_LEN: usize = 16;

/// Entries per namespace.
pub const MAX_ENTRIES: usize = 8;

/// Upper bound on an encoded [`KvRecord`].
///
/// Each entry costs at most 1 + 16 bytes of key plus a 10 byte varint.
pub const RECORD_BUF_LEN: usize = 1 + MAX_KEY_LEN + 1 + MAX_ENTRIES * (1 + MAX_KEY_LEN + 10);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage device failed to {operation}")]
    Device { operation: &'static str },

    #[error("stored record for namespace `{namespace}` is corrupt")]
    Corrupt { namespace: &'static str },

    #[error("namespace already holds {capacity} keys")]
    NamespaceFull { capacity: usize },

    #[error("key or namespace longer than {max} bytes")]
    KeyTooLong { max: usize },
}

/// Persistent `u64` values under one namespace.
///
/// Implementations bind the namespace when they are constructed.
pub trait KeyValueStore {
    /// `Ok(None)` when the key (or the whole namespace) was never written.
    fn get_u64(&mut self, key: &str) -> Result<Option<u64>, StorageError>;

    fn set_u64(&mut self, key: &str, value: u64) -> Result<(), StorageError>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: heapless::String<MAX_KEY_LEN>,
    pub value: u64,
}

/// On-disk representation of one namespace.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KvRecord {
    pub namespace: heapless::String<MAX_KEY_LEN>,
    pub entries: heapless::Vec<KvEntry, MAX_ENTRIES>,
}

impl KvRecord {
    pub fn new(namespace: &str) -> Result<Self, StorageError> {
        Ok(Self {
            namespace: bounded(namespace)?,
            entries: heapless::Vec::new(),
        })
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|entry| entry.key.as_str() == key)
            .map(|entry| entry.value)
    }

    /// Overwrite `key`, or append it if it is new.
    pub fn set(&mut self, key: &str, value: u64) -> Result<(), StorageError> {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.key.as_str() == key) {
            entry.value = value;
            return Ok(());
        }

        let entry = KvEntry {
            key: bounded(key)?,
            value,
        };
        self.entries
            .push(entry)
            .map_err(|_| StorageError::NamespaceFull {
                capacity: MAX_ENTRIES,
            })
    }

    /// Serialize into `buf`, returning the used prefix.
    pub fn encode<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], StorageError> {
        postcard::to_slice(self, buf).map_err(|_| StorageError::Device {
            operation: "encode record",
        })
    }

    /// Parse a record and check that it belongs to `namespace`.
    pub fn decode(bytes: &[u8], namespace: &'static str) -> Result<Self, StorageError> {
        let record: Self =
            postcard::from_bytes(bytes).map_err(|_| StorageError::Corrupt { namespace })?;
        if record.namespace.as_str() != namespace {
            return Err(StorageError::Corrupt { namespace });
        }
        Ok(record)
    }
}

fn bounded(s: &str) -> Result<heapless::String<MAX_KEY_LEN>, StorageError> {
    heapless::String::try_from(s).map_err(|_| StorageError::KeyTooLong { max: MAX_KEY_LEN })
}

/// Volatile store that keeps the encoded record in RAM, exactly as it would
/// sit on a card. Used by the tests and the simulator's fallback.
pub struct MemoryStore {
    namespace: &'static str,
    bytes: heapless::Vec<u8, RECORD_BUF_LEN>,
}

impl MemoryStore {
    pub const fn new(namespace: &'static str) -> Self {
        Self {
            namespace,
            bytes: heapless::Vec::new(),
        }
    }

    fn load(&self) -> Result<KvRecord, StorageError> {
        if self.bytes.is_empty() {
            KvRecord::new(self.namespace)
        } else {
            KvRecord::decode(&self.bytes, self.namespace)
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get_u64(&mut self, key: &str) -> Result<Option<u64>, StorageError> {
        Ok(self.load()?.get(key))
    }

    fn set_u64(&mut self, key: &str, value: u64) -> Result<(), StorageError> {
        let mut record = self.load()?;
        record.set(key, value)?;

        let mut buf = [0u8; RECORD_BUF_LEN];
        let encoded = record.encode(&mut buf)?;
        self.bytes.clear();
        self.bytes
            .extend_from_slice(encoded)
            .map_err(|_| StorageError::Device {
                operation: "store record",
            })
    }
}
