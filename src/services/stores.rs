//! Storage seams for the evaluation services
//!
//! The orchestrators reach entity and record storage through traits, the
//! same way the response cache does, so failure-path behavior is testable
//! against in-memory fakes while production runs on MongoDB.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId};

use crate::db::mongo::MongoCollection;
use crate::db::schemas::{LearningNodeDoc, ProjectReviewDoc, TestAttemptDoc};
use crate::types::UltimaError;

/// Learning node lookups and progress writes, scoped to an owner
#[async_trait]
pub trait LearningNodeStore: Send + Sync {
    /// One node owned by the user
    async fn find_owned(
        &self,
        user_id: ObjectId,
        node_id: ObjectId,
    ) -> Result<Option<LearningNodeDoc>, UltimaError>;

    /// All of the given nodes that the user owns
    async fn find_owned_many(
        &self,
        user_id: ObjectId,
        node_ids: &[ObjectId],
    ) -> Result<Vec<LearningNodeDoc>, UltimaError>;

    /// Write back a node after a progress change
    async fn persist(&self, node_id: ObjectId, node: LearningNodeDoc) -> Result<(), UltimaError>;
}

/// Immutable test attempt records
#[async_trait]
pub trait TestAttemptStore: Send + Sync {
    async fn record(&self, attempt: TestAttemptDoc) -> Result<ObjectId, UltimaError>;

    /// Attempts for a user, newest first, optionally scoped to one node
    async fn list(
        &self,
        user_id: ObjectId,
        node_id: Option<ObjectId>,
        limit: i64,
        skip: u64,
    ) -> Result<Vec<TestAttemptDoc>, UltimaError>;
}

/// Immutable project review records
#[async_trait]
pub trait ProjectReviewStore: Send + Sync {
    async fn record(&self, review: ProjectReviewDoc) -> Result<ObjectId, UltimaError>;

    async fn for_node(
        &self,
        user_id: ObjectId,
        node_id: ObjectId,
    ) -> Result<Vec<ProjectReviewDoc>, UltimaError>;

    async fn by_id(
        &self,
        user_id: ObjectId,
        review_id: ObjectId,
    ) -> Result<Option<ProjectReviewDoc>, UltimaError>;

    async fn list(
        &self,
        user_id: ObjectId,
        limit: i64,
        skip: u64,
    ) -> Result<Vec<ProjectReviewDoc>, UltimaError>;

    /// Delete one record scoped to the user, returning the count
    async fn delete(&self, user_id: ObjectId, review_id: ObjectId) -> Result<u64, UltimaError>;
}

/// MongoDB-backed node store
pub struct MongoNodeStore {
    collection: MongoCollection<LearningNodeDoc>,
}

impl MongoNodeStore {
    pub fn new(collection: MongoCollection<LearningNodeDoc>) -> Self {
        Self { collection }
    }
}

#[async_trait]
impl LearningNodeStore for MongoNodeStore {
    async fn find_owned(
        &self,
        user_id: ObjectId,
        node_id: ObjectId,
    ) -> Result<Option<LearningNodeDoc>, UltimaError> {
        self.collection
            .find_one(doc! { "_id": node_id, "created_by": user_id })
            .await
    }

    async fn find_owned_many(
        &self,
        user_id: ObjectId,
        node_ids: &[ObjectId],
    ) -> Result<Vec<LearningNodeDoc>, UltimaError> {
        self.collection
            .find_many(doc! {
                "_id": { "$in": node_ids.to_vec() },
                "created_by": user_id,
            })
            .await
    }

    async fn persist(&self, node_id: ObjectId, node: LearningNodeDoc) -> Result<(), UltimaError> {
        self.collection.replace_by_id(node_id, node).await
    }
}

/// MongoDB-backed attempt store
pub struct MongoAttemptStore {
    collection: MongoCollection<TestAttemptDoc>,
}

impl MongoAttemptStore {
    pub fn new(collection: MongoCollection<TestAttemptDoc>) -> Self {
        Self { collection }
    }
}

#[async_trait]
impl TestAttemptStore for MongoAttemptStore {
    async fn record(&self, attempt: TestAttemptDoc) -> Result<ObjectId, UltimaError> {
        self.collection.insert_one(attempt).await
    }

    async fn list(
        &self,
        user_id: ObjectId,
        node_id: Option<ObjectId>,
        limit: i64,
        skip: u64,
    ) -> Result<Vec<TestAttemptDoc>, UltimaError> {
        let mut filter = doc! { "user_id": user_id };
        if let Some(node_id) = node_id {
            filter.insert("node_ids", node_id);
        }

        self.collection
            .find_many_sorted(filter, Some(doc! { "timestamp": -1 }), Some(limit), Some(skip))
            .await
    }
}

/// MongoDB-backed review store
pub struct MongoReviewStore {
    collection: MongoCollection<ProjectReviewDoc>,
}

impl MongoReviewStore {
    pub fn new(collection: MongoCollection<ProjectReviewDoc>) -> Self {
        Self { collection }
    }
}

#[async_trait]
impl ProjectReviewStore for MongoReviewStore {
    async fn record(&self, review: ProjectReviewDoc) -> Result<ObjectId, UltimaError> {
        self.collection.insert_one(review).await
    }

    async fn for_node(
        &self,
        user_id: ObjectId,
        node_id: ObjectId,
    ) -> Result<Vec<ProjectReviewDoc>, UltimaError> {
        self.collection
            .find_many_sorted(
                doc! { "user_id": user_id, "node_id": node_id },
                Some(doc! { "timestamp": -1 }),
                None,
                None,
            )
            .await
    }

    async fn by_id(
        &self,
        user_id: ObjectId,
        review_id: ObjectId,
    ) -> Result<Option<ProjectReviewDoc>, UltimaError> {
        self.collection
            .find_one(doc! { "_id": review_id, "user_id": user_id })
            .await
    }

    async fn list(
        &self,
        user_id: ObjectId,
        limit: i64,
        skip: u64,
    ) -> Result<Vec<ProjectReviewDoc>, UltimaError> {
        self.collection
            .find_many_sorted(
                doc! { "user_id": user_id },
                Some(doc! { "timestamp": -1 }),
                Some(limit),
                Some(skip),
            )
            .await
    }

    async fn delete(&self, user_id: ObjectId, review_id: ObjectId) -> Result<u64, UltimaError> {
        self.collection
            .delete_one(doc! { "_id": review_id, "user_id": user_id })
            .await
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory store fakes for service tests

    use super::*;
    use dashmap::DashMap;
    use std::sync::Mutex;

    /// Node store over a DashMap; `persist` requires the node to exist
    #[derive(Default)]
    pub struct MemoryNodeStore {
        nodes: DashMap<ObjectId, LearningNodeDoc>,
    }

    impl MemoryNodeStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, mut node: LearningNodeDoc) -> ObjectId {
            let id = node._id.unwrap_or_else(ObjectId::new);
            node._id = Some(id);
            self.nodes.insert(id, node);
            id
        }

        pub fn total_xp(&self, id: ObjectId) -> u64 {
            self.nodes.get(&id).map(|n| n.total_xp).unwrap_or(0)
        }
    }

    #[async_trait]
    impl LearningNodeStore for MemoryNodeStore {
        async fn find_owned(
            &self,
            user_id: ObjectId,
            node_id: ObjectId,
        ) -> Result<Option<LearningNodeDoc>, UltimaError> {
            Ok(self
                .nodes
                .get(&node_id)
                .filter(|n| n.created_by == user_id)
                .map(|n| n.clone()))
        }

        async fn find_owned_many(
            &self,
            user_id: ObjectId,
            node_ids: &[ObjectId],
        ) -> Result<Vec<LearningNodeDoc>, UltimaError> {
            Ok(node_ids
                .iter()
                .filter_map(|id| {
                    self.nodes
                        .get(id)
                        .filter(|n| n.created_by == user_id)
                        .map(|n| n.clone())
                })
                .collect())
        }

        async fn persist(
            &self,
            node_id: ObjectId,
            node: LearningNodeDoc,
        ) -> Result<(), UltimaError> {
            if !self.nodes.contains_key(&node_id) {
                return Err(UltimaError::Database(format!(
                    "Replace matched no document for id {}",
                    node_id
                )));
            }
            self.nodes.insert(node_id, node);
            Ok(())
        }
    }

    /// Attempt store over a Vec
    #[derive(Default)]
    pub struct MemoryAttemptStore {
        attempts: Mutex<Vec<TestAttemptDoc>>,
    }

    impl MemoryAttemptStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.attempts.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl TestAttemptStore for MemoryAttemptStore {
        async fn record(&self, mut attempt: TestAttemptDoc) -> Result<ObjectId, UltimaError> {
            let id = ObjectId::new();
            attempt._id = Some(id);
            self.attempts.lock().unwrap().push(attempt);
            Ok(id)
        }

        async fn list(
            &self,
            user_id: ObjectId,
            node_id: Option<ObjectId>,
            limit: i64,
            skip: u64,
        ) -> Result<Vec<TestAttemptDoc>, UltimaError> {
            let mut matched: Vec<TestAttemptDoc> = self
                .attempts
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.user_id == user_id)
                .filter(|a| node_id.map_or(true, |n| a.node_ids.contains(&n)))
                .cloned()
                .collect();
            matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            Ok(matched
                .into_iter()
                .skip(skip as usize)
                .take(limit as usize)
                .collect())
        }
    }

    /// Review store over a Vec
    #[derive(Default)]
    pub struct MemoryReviewStore {
        reviews: Mutex<Vec<ProjectReviewDoc>>,
    }

    impl MemoryReviewStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.reviews.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl ProjectReviewStore for MemoryReviewStore {
        async fn record(&self, mut review: ProjectReviewDoc) -> Result<ObjectId, UltimaError> {
            let id = ObjectId::new();
            review._id = Some(id);
            self.reviews.lock().unwrap().push(review);
            Ok(id)
        }

        async fn for_node(
            &self,
            user_id: ObjectId,
            node_id: ObjectId,
        ) -> Result<Vec<ProjectReviewDoc>, UltimaError> {
            let mut matched: Vec<ProjectReviewDoc> = self
                .reviews
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id && r.node_id == node_id)
                .cloned()
                .collect();
            matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            Ok(matched)
        }

        async fn by_id(
            &self,
            user_id: ObjectId,
            review_id: ObjectId,
        ) -> Result<Option<ProjectReviewDoc>, UltimaError> {
            Ok(self
                .reviews
                .lock()
                .unwrap()
                .iter()
                .find(|r| r._id == Some(review_id) && r.user_id == user_id)
                .cloned())
        }

        async fn list(
            &self,
            user_id: ObjectId,
            limit: i64,
            skip: u64,
        ) -> Result<Vec<ProjectReviewDoc>, UltimaError> {
            let mut matched: Vec<ProjectReviewDoc> = self
                .reviews
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect();
            matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            Ok(matched
                .into_iter()
                .skip(skip as usize)
                .take(limit as usize)
                .collect())
        }

        async fn delete(
            &self,
            user_id: ObjectId,
            review_id: ObjectId,
        ) -> Result<u64, UltimaError> {
            let mut reviews = self.reviews.lock().unwrap();
            let before = reviews.len();
            reviews.retain(|r| !(r._id == Some(review_id) && r.user_id == user_id));
            Ok((before - reviews.len()) as u64)
        }
    }
}
