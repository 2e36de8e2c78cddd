//! Cached AI response document schema
//!
//! Cache entries are keyed by (cache_type, hash) and expire through a
//! store-native TTL index on `expires_at`. Reads still filter on
//! `expires_at` so an expired entry is never served before the TTL
//! monitor removes it.

use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for cached responses
pub const CACHED_RESPONSE_COLLECTION: &str = "cached_responses";

/// Cached AI response stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CachedResponseDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Cache namespace: "test" or "review"
    pub cache_type: String,

    /// SHA-256 fingerprint of the request inputs, lowercase hex
    pub hash: String,

    /// Node the entry was computed for, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<ObjectId>,

    /// Level the entry was computed at, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,

    /// The cached payload
    pub result: Bson,

    /// When the entry was written
    pub created_at: DateTime,

    /// When the entry stops being served
    pub expires_at: DateTime,
}

impl CachedResponseDoc {
    /// Build a cache entry expiring `ttl` from now
    pub fn new(cache_type: String, hash: String, result: Bson, ttl: Duration) -> Self {
        let now = DateTime::now();
        Self {
            _id: None,
            metadata: Metadata::new(),
            cache_type,
            hash,
            node_id: None,
            level: None,
            result,
            created_at: now,
            expires_at: DateTime::from_millis(now.timestamp_millis() + ttl.as_millis() as i64),
        }
    }

    /// Whether the entry is past its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at <= DateTime::now()
    }
}

impl IntoIndexes for CachedResponseDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One entry per fingerprint within a namespace
            (
                doc! { "cache_type": 1, "hash": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("cache_type_hash_unique".to_string())
                        .build(),
                ),
            ),
            // TTL monitor removes entries once expires_at passes
            (
                doc! { "expires_at": 1 },
                Some(
                    IndexOptions::builder()
                        .expire_after(Duration::from_secs(0))
                        .name("expires_at_ttl".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for CachedResponseDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_window() {
        let entry = CachedResponseDoc::new(
            "test".into(),
            "abc".into(),
            Bson::String("payload".into()),
            Duration::from_secs(7 * 24 * 60 * 60),
        );
        assert!(!entry.is_expired());

        let mut expired = entry.clone();
        expired.expires_at = DateTime::from_millis(DateTime::now().timestamp_millis() - 1000);
        assert!(expired.is_expired());
    }
}
