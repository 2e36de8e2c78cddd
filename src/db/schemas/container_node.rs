//! Container node document schema
//!
//! Containers organize learning nodes into a tree. A container may hold
//! other containers and learning nodes; ordering within a parent is kept
//! in `order_index`.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for container nodes
pub const CONTAINER_NODE_COLLECTION: &str = "container_nodes";

/// Container node document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ContainerNodeDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Display title
    pub title: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Optional category label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Parent container; None for roots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ObjectId>,

    /// Position among siblings
    #[serde(default)]
    pub order_index: i32,

    /// Owning user
    pub created_by: ObjectId,
}

impl ContainerNodeDoc {
    /// Create a new container node
    pub fn new(
        title: String,
        description: String,
        category: Option<String>,
        parent_id: Option<ObjectId>,
        order_index: i32,
        created_by: ObjectId,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            title,
            description,
            category,
            parent_id,
            order_index,
            created_by,
        }
    }
}

impl IntoIndexes for ContainerNodeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Containers are listed by owner and parent
            (
                doc! { "created_by": 1, "parent_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("owner_parent_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ContainerNodeDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
