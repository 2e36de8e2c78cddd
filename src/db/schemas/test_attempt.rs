//! Test attempt document schema
//!
//! Immutable audit record of a scored test submission. Attempts are only
//! ever inserted and read, never updated.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for test attempts
pub const TEST_ATTEMPT_COLLECTION: &str = "test_attempts";

/// One scored question within an attempt
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ScoredQuestion {
    pub question: String,
    pub user_answer: String,
    pub correct_answer: String,
    /// 100 for a correct answer, 0 otherwise
    pub score: u32,
    #[serde(default)]
    pub explanation: String,
}

/// Test attempt document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TestAttemptDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// User who submitted the test
    pub user_id: ObjectId,

    /// Learning nodes the test covered
    pub node_ids: Vec<ObjectId>,

    /// Per-question results
    pub questions: Vec<ScoredQuestion>,

    /// Rounded mean of question scores, [0, 100]
    pub total_score: u32,

    /// XP awarded across all covered nodes
    pub xp_earned: u64,

    /// Difficulty stage the test was generated at
    pub difficulty: String,

    /// Seconds the user spent, if reported by the client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u32>,

    /// When the attempt was scored
    pub timestamp: DateTime,
}

impl IntoIndexes for TestAttemptDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // History queries are by user, newest first
            (
                doc! { "user_id": 1, "timestamp": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_timestamp_index".to_string())
                        .build(),
                ),
            ),
            // Per-node history
            (
                doc! { "node_ids": 1 },
                Some(
                    IndexOptions::builder()
                        .name("node_ids_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for TestAttemptDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
