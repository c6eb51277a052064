use crate::context::CacheContext;
use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Version of the persisted cache index document.
///
/// Version 1 was a bare JSON array of class tokens with no identity; it is still recognised so
/// it can be reported as a legacy miss and upgraded on the next write.
pub const CACHE_SCHEMA_VERSION: u32 = 2;

/// The persisted cache index: one document holding independent entries for many fingerprints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheIndex {
    pub schema_version: u32,
    #[serde(default)]
    pub contexts: BTreeMap<String, CacheEntry>,
    /// Single slot used by stores that were opened without a context descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unscoped: Option<UnscopedEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub context: CacheContext,
    pub values: Vec<String>,
    #[serde(default)]
    pub updated_at_millis: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnscopedEntry {
    pub values: Vec<String>,
    #[serde(default)]
    pub updated_at_millis: u64,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            contexts: BTreeMap::new(),
            unscoped: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty() && self.unscoped.is_none()
    }

    /// Number of slots (fingerprint entries plus the unscoped slot, if present).
    pub fn slot_count(&self) -> usize {
        self.contexts.len() + usize::from(self.unscoped.is_some())
    }

    /// Total number of tokens held across all slots.
    pub fn value_count(&self) -> usize {
        self.contexts
            .values()
            .map(|entry| entry.values.len())
            .sum::<usize>()
            + self.unscoped.as_ref().map_or(0, |slot| slot.values.len())
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Classification of raw persisted bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum DecodedIndex {
    Current(CacheIndex),
    /// A bare token array, or an object declaring a schema older than the current one.
    Legacy { schema_version: Option<u32> },
    /// Written by a newer tool; left untouched until this tool writes.
    Unsupported { schema_version: u32 },
    /// Unparseable or structurally invalid.
    Corrupt { message: String },
}

pub(crate) fn decode_index(bytes: &[u8]) -> DecodedIndex {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(err) => {
            return DecodedIndex::Corrupt {
                message: CacheError::from(err).to_string(),
            }
        }
    };

    let schema_version = match &value {
        Value::Array(items) => {
            return if items.iter().all(Value::is_string) {
                DecodedIndex::Legacy {
                    schema_version: None,
                }
            } else {
                DecodedIndex::Corrupt {
                    message: "legacy token array contains non-string values".to_string(),
                }
            };
        }
        Value::Object(map) => match map.get("schemaVersion") {
            None => {
                return DecodedIndex::Legacy {
                    schema_version: None,
                }
            }
            Some(raw) => match raw.as_u64().and_then(|v| u32::try_from(v).ok()) {
                Some(version) => version,
                None => {
                    return DecodedIndex::Corrupt {
                        message: "schemaVersion is not an unsigned integer".to_string(),
                    }
                }
            },
        },
        _ => {
            return DecodedIndex::Corrupt {
                message: "cache index is neither an object nor an array".to_string(),
            }
        }
    };

    if schema_version < CACHE_SCHEMA_VERSION {
        return DecodedIndex::Legacy {
            schema_version: Some(schema_version),
        };
    }
    if schema_version > CACHE_SCHEMA_VERSION {
        return DecodedIndex::Unsupported { schema_version };
    }

    match serde_json::from_value::<CacheIndex>(value) {
        Ok(index) => DecodedIndex::Current(index),
        Err(err) => DecodedIndex::Corrupt {
            message: CacheError::from(err).to_string(),
        },
    }
}
