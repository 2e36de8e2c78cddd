//! Project review document schema
//!
//! Immutable audit record of an AI project review. Reviews are inserted
//! once and read back for history; the only mutation is a user-initiated
//! delete of their own record.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for project reviews
pub const PROJECT_REVIEW_COLLECTION: &str = "project_reviews";

/// Client-supplied details about the submitted artifact
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SubmissionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// Per-dimension rubric scores, each [0, 100]
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RubricBreakdown {
    #[serde(default)]
    pub correctness: u32,
    #[serde(default)]
    pub architecture: u32,
    #[serde(default)]
    pub readability: u32,
    #[serde(default)]
    pub edge_cases: u32,
    #[serde(default)]
    pub best_practices: u32,
}

/// Structured review outcome
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ReviewResult {
    /// Final score after strictness adjustment, [0, 100]
    pub score: u32,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub mastery_achieved: bool,
    #[serde(default)]
    pub rubric_breakdown: RubricBreakdown,
    /// True when the reviewer's output could not be parsed and a neutral
    /// default was substituted
    #[serde(default)]
    pub fallback: bool,
}

/// Project review document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProjectReviewDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// User who submitted the project
    pub user_id: ObjectId,

    /// Learning node the project was reviewed against
    pub node_id: ObjectId,

    /// One of code, editor, github, upload
    pub submission_type: String,

    /// The submitted content (code text, editor contents, or a URL)
    pub submission_content: String,

    #[serde(default)]
    pub submission_metadata: SubmissionMetadata,

    /// Rubric in effect at review time, if the node carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rubric_used: Option<bson::Bson>,

    pub review_result: ReviewResult,

    /// XP awarded to the node
    pub xp_earned: u64,

    /// When the review completed
    pub timestamp: DateTime,
}

impl IntoIndexes for ProjectReviewDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "user_id": 1, "timestamp": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_timestamp_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "node_id": 1, "timestamp": -1 },
                Some(
                    IndexOptions::builder()
                        .name("node_timestamp_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ProjectReviewDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
