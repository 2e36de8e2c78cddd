//! Learning node document schema
//!
//! A learning node is the unit that accumulates experience. Its level,
//! intra-level XP and milestone tier are derived from `total_xp` and are
//! only ever written through [`LearningNodeDoc::apply_progress`], so they
//! cannot drift from the total.

use bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::progression::{MilestoneTier, Progress};

/// Collection name for learning nodes
pub const LEARNING_NODE_COLLECTION: &str = "learning_nodes";

/// Learning node document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LearningNodeDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Display title
    pub title: String,

    /// Free-form description; also feeds test generation prompts
    #[serde(default)]
    pub description: String,

    /// Parent container; None for uncategorized nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_container_id: Option<ObjectId>,

    /// Cumulative experience; never decreases
    #[serde(default)]
    pub total_xp: u64,

    /// Derived level, [1, 100]
    #[serde(default = "default_level")]
    pub level: u32,

    /// Derived XP within the current level, [0, 100)
    #[serde(default)]
    pub xp_in_level: u32,

    /// Derived milestone tier
    #[serde(default)]
    pub milestone_tier: MilestoneTier,

    /// Optional rubric used when reviewing projects against this node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_rubric: Option<Bson>,

    /// Owning user
    pub created_by: ObjectId,
}

fn default_level() -> u32 {
    1
}

impl LearningNodeDoc {
    /// Create a new learning node with fresh progress
    pub fn new(
        title: String,
        description: String,
        parent_container_id: Option<ObjectId>,
        created_by: ObjectId,
    ) -> Self {
        let mut node = Self {
            _id: None,
            metadata: Metadata::new(),
            title,
            description,
            parent_container_id,
            total_xp: 0,
            level: 1,
            xp_in_level: 0,
            milestone_tier: MilestoneTier::Novice,
            review_rubric: None,
            created_by,
        };
        node.apply_progress(Progress::new());
        node
    }

    /// Current progress as a value
    pub fn progress(&self) -> Progress {
        Progress::from_total_xp(self.total_xp)
    }

    /// Write back a progress value, keeping all derived fields consistent
    pub fn apply_progress(&mut self, progress: Progress) {
        self.total_xp = progress.total_xp;
        self.level = progress.level;
        self.xp_in_level = progress.xp_in_level;
        self.milestone_tier = progress.milestone_tier;
    }
}

impl IntoIndexes for LearningNodeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "created_by": 1, "parent_container_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("owner_container_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for LearningNodeDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
